use std::fmt;

/// User-facing failure categories.
///
/// Each one is scoped to the action that triggered it and shown next to that
/// action; none of them ends the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionError {
    /// The detection model could not be loaded. Terminal for the session.
    ModelLoad,
    /// Camera permission refused or device unavailable. The user may retry.
    CameraAccess,
    /// Saving a snapshot failed. The user may retry.
    Save,
    /// Saving or listing history needs a signed-in user.
    SignInRequired,
    /// Save was requested with no current detections.
    NothingToSave,
}

impl SessionError {
    pub fn message(&self) -> &'static str {
        match self {
            SessionError::ModelLoad => "Failed to load the object detection model",
            SessionError::CameraAccess => {
                "Failed to access the camera. Make sure camera permission is granted."
            }
            SessionError::Save => "Failed to save detection results",
            SessionError::SignInRequired => "Sign in to save and view detection history",
            SessionError::NothingToSave => "There are no detections to save",
        }
    }

    /// True when the user can reasonably try the same action again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SessionError::ModelLoad)
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for SessionError {}
