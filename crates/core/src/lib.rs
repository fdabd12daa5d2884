pub mod brief;
pub mod config;
pub mod generation;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod testing;

pub use brief::{derive_brief, BriefError, CreativeBrief, SceneBrief};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, GenerationConfig,
    SanitizedConfig, ServerConfig,
};
pub use generation::{
    CredentialProvider, CredentialRefresh, Credentials, EnvCredentialProvider, GenerationClient,
    HttpGenerationClient, LoggingCredentialRefresh, OperationKind, OperationOutput, OperationPoll,
    OperationRequest, RawFailure, StartedOperation,
};
pub use job::{
    InMemoryJobStore, Job, JobEvent, JobFilter, JobId, JobPatch, JobResult, JobSpec, JobStatus,
    JobStore, JobStoreExt, JobView, OperationHandle, OperationPhase, RetryState, StoreError,
};
pub use orchestrator::{
    OrchestratorConfig, OrchestratorError, OrchestratorStatus, ProductionOrchestrator,
};
pub use retry::{classify, BackoffDecision, BackoffParams, BackoffPolicy, FailureClass};
