use crate::script::StepKind;

/// Reasons a run is refused or ends in error.
///
/// The `Display` text is what callbacks receive as the error reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("license invalid")]
    LicenseInvalid,
    #[error("license expired")]
    LicenseExpired,
    #[error("already running: another script is executing")]
    AlreadyRunning,
    #[error("already running: this engine is busy")]
    EngineBusy,
    #[error("step failed: {0}")]
    StepFailed(StepKind),
}

impl ExecutionError {
    pub fn is_license(&self) -> bool {
        matches!(
            self,
            ExecutionError::LicenseInvalid | ExecutionError::LicenseExpired
        )
    }
}
