//! The locally known user, as far as sync cares.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the user is in the login flow on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoggedInStatus {
    /// An OTP was sent and has not been entered yet.
    OtpRequested,
    /// Fully logged in.
    LoggedIn,
    /// The user is resetting their PIN on this device.
    ResettingPin,
    /// A PIN reset was requested and awaits approval.
    ResetPinRequested,
    /// The user logged in on another device.
    Unauthorized,
}

/// Whether an administrator allows the user to sync data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserStatus {
    /// Registration awaits approval.
    WaitingForApproval,
    /// Allowed to sync.
    ApprovedForSyncing,
    /// Denied.
    DisapprovedForSyncing,
}

/// The user stored on this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier.
    pub uuid: Uuid,
    /// Display name.
    pub full_name: String,
    /// Login progress.
    pub logged_in_status: LoggedInStatus,
    /// Approval state.
    pub status: UserStatus,
    /// Facility the user is currently working in.
    pub current_facility_uuid: Uuid,
}

impl User {
    /// Returns true only for a logged-in user approved for syncing.
    pub fn can_sync_data(&self) -> bool {
        self.logged_in_status == LoggedInStatus::LoggedIn
            && self.status == UserStatus::ApprovedForSyncing
    }
}

/// Access to the current session.
pub trait UserSession: Send + Sync {
    /// The user stored on this device, if any.
    fn logged_in_user(&self) -> Option<User>;

    /// Returns true if any user is stored on this device.
    fn is_user_present_locally(&self) -> bool {
        self.logged_in_user().is_some()
    }

    /// Returns true if the stored user may sync right now.
    fn can_sync_data(&self) -> bool {
        self.logged_in_user()
            .is_some_and(|user| user.can_sync_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(logged_in_status: LoggedInStatus, status: UserStatus) -> User {
        User {
            uuid: Uuid::new_v4(),
            full_name: "Anish Acharya".into(),
            logged_in_status,
            status,
            current_facility_uuid: Uuid::new_v4(),
        }
    }

    #[test]
    fn only_logged_in_and_approved_users_can_sync() {
        let logged_in = [
            LoggedInStatus::OtpRequested,
            LoggedInStatus::LoggedIn,
            LoggedInStatus::ResettingPin,
            LoggedInStatus::ResetPinRequested,
            LoggedInStatus::Unauthorized,
        ];
        let statuses = [
            UserStatus::WaitingForApproval,
            UserStatus::ApprovedForSyncing,
            UserStatus::DisapprovedForSyncing,
        ];

        for l in logged_in {
            for s in statuses {
                let expected =
                    l == LoggedInStatus::LoggedIn && s == UserStatus::ApprovedForSyncing;
                assert_eq!(user(l, s).can_sync_data(), expected, "{l:?} {s:?}");
            }
        }
    }

    #[test]
    fn session_defaults() {
        struct Session(Option<User>);
        impl UserSession for Session {
            fn logged_in_user(&self) -> Option<User> {
                self.0.clone()
            }
        }

        assert!(!Session(None).is_user_present_locally());
        assert!(!Session(None).can_sync_data());

        let waiting = Session(Some(user(
            LoggedInStatus::LoggedIn,
            UserStatus::WaitingForApproval,
        )));
        assert!(waiting.is_user_present_locally());
        assert!(!waiting.can_sync_data());
    }
}
