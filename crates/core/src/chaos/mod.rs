pub mod collaborators;
pub mod scheduler;
pub mod selection;

pub use collaborators::{
    ActionExecutor, ActivitySource, AllowAll, CollaboratorError, Collaborators, NoProvocation,
    ProvocationSource, SafetyGate,
};
pub use scheduler::{
    ChaosScheduler, CycleError, CycleSummary, DecisionCycle, GuildOutcome, LoopReport,
    SchedulerError,
};
