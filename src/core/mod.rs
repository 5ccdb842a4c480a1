pub mod activity;
pub mod booking;
pub mod messages;
pub mod poller;
pub mod reminders;
pub mod schedule;

pub use activity::Activity;
pub use booking::{BookingRequest, BookingService};
pub use messages::Templates;
pub use poller::ReplyPoller;
pub use reminders::ReminderEngine;
pub use schedule::ScheduleService;
