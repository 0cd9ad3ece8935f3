/// Single-flight gate for asynchronous policy evaluation.
///
/// The driving loop owns one gate per policy and moves it through
/// `Idle -> Requesting -> Applying -> Idle`. A request can only be issued
/// from `Idle`, which is what guarantees at most one evaluation in flight;
/// `abort` returns to `Idle` from any in-flight state when the evaluation
/// fails or is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Requesting,
    Applying,
}

#[derive(Debug)]
pub struct PolicyGate {
    state: GateState,
}

impl Default for PolicyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Idle,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn in_flight(&self) -> bool {
        self.state != GateState::Idle
    }

    /// Claim the gate for a new request. Returns false if an evaluation is
    /// already outstanding.
    pub fn try_acquire(&mut self) -> bool {
        if self.state == GateState::Idle {
            self.state = GateState::Requesting;
            true
        } else {
            false
        }
    }

    /// A result arrived and is about to be fed to `set_force`. Returns
    /// false if no request was outstanding (spurious result).
    pub fn begin_apply(&mut self) -> bool {
        if self.state == GateState::Requesting {
            self.state = GateState::Applying;
            true
        } else {
            false
        }
    }

    /// The result has been applied; the gate is free again.
    pub fn finish(&mut self) {
        self.state = GateState::Idle;
    }

    /// The in-flight evaluation failed or was abandoned.
    pub fn abort(&mut self) {
        self.state = GateState::Idle;
    }
}
