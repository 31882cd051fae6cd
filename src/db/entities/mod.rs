pub mod maintenance_window;
pub mod monitored_target;
pub mod notification_attempt;
pub mod probe_record;
pub mod target_dependency;
pub mod user;

// Prelude module for easy importing of all entities and their related types
pub mod prelude {
    pub use super::maintenance_window::Entity as MaintenanceWindow;
    pub use super::maintenance_window::Model as MaintenanceWindowModel;

    pub use super::monitored_target::Entity as MonitoredTarget;
    pub use super::monitored_target::Model as MonitoredTargetModel;

    pub use super::notification_attempt::Entity as NotificationAttempt;
    pub use super::notification_attempt::Model as NotificationAttemptModel;

    pub use super::probe_record::Entity as ProbeRecord;
    pub use super::probe_record::Model as ProbeRecordModel;

    pub use super::target_dependency::Entity as TargetDependency;
    pub use super::target_dependency::Model as TargetDependencyModel;

    pub use super::user::Entity as User;
    pub use super::user::Model as UserModel;
}
