//! Named save-points on the appliance.

use crate::operation::{
    Operation, CHECKPOINT_NAME_OPTION, REMOVE_CHECKPOINT, ROLLBACK_CHECKPOINT, SAVE_CHECKPOINT,
};
use chrono::{DateTime, Local, TimeZone};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    name: String,
}

impl Checkpoint {
    /// A checkpoint named after the current local time, `CPyyyyMMddHHmmss`.
    pub fn now() -> Self {
        Self::at(&Local::now())
    }

    pub fn at<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        Self {
            name: time.format("CP%Y%m%d%H%M%S").to_string(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn operation(&self, op: &str) -> Operation {
        Operation::new(op).with_option(CHECKPOINT_NAME_OPTION, self.name.clone())
    }

    pub fn save_operation(&self) -> Operation {
        self.operation(SAVE_CHECKPOINT)
    }

    pub fn rollback_operation(&self) -> Operation {
        self.operation(ROLLBACK_CHECKPOINT)
    }

    pub fn remove_operation(&self) -> Operation {
        self.operation(REMOVE_CHECKPOINT)
    }

    /// Whether `op` is this checkpoint's save operation.
    pub fn is_save_of(&self, op: &Operation) -> bool {
        op.name() == SAVE_CHECKPOINT && op.option_value(CHECKPOINT_NAME_OPTION) == Some(self.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_name_format_uses_24_hour_clock() {
        let t = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(17, 5, 9)
            .unwrap()
            .and_utc();
        assert_eq!(Checkpoint::at(&t).name(), "CP20240309170509");
    }

    #[test]
    fn test_now_shape() {
        let cp = Checkpoint::now();
        assert!(cp.name().starts_with("CP"));
        assert_eq!(cp.name().len(), 16);
        assert!(cp.name()[2..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_operations_carry_name() {
        let cp = Checkpoint::named("CP1");
        let save = cp.save_operation();
        assert_eq!(save.name(), SAVE_CHECKPOINT);
        assert_eq!(save.option_value(CHECKPOINT_NAME_OPTION), Some("CP1"));
        assert!(cp.is_save_of(&save));
        assert!(!cp.is_save_of(&cp.rollback_operation()));
        assert_eq!(cp.remove_operation().name(), REMOVE_CHECKPOINT);
    }
}
