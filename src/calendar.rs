use chrono::NaiveDateTime;

use crate::time_codec::{self, ServiceClass, OVERNIGHT_END_HOUR};

/// Decides which static service is active at a local instant and which
/// `service_id` in the static timetable carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCalendar {
    pub overnight_end_hour: u32,
    pub weekday_service_id: String,
    pub weekend_service_id: String,
    pub overnight_service_id: String,
}

impl Default for ServiceCalendar {
    fn default() -> Self {
        Self {
            overnight_end_hour: OVERNIGHT_END_HOUR,
            weekday_service_id: "Weekday".to_string(),
            weekend_service_id: "SatSun".to_string(),
            overnight_service_id: "Overnight".to_string(),
        }
    }
}

impl ServiceCalendar {
    pub fn service_class(&self, at: &NaiveDateTime) -> ServiceClass {
        time_codec::service_day_with_cutoff(at, self.overnight_end_hour)
    }

    pub fn service_id(&self, class: ServiceClass) -> &str {
        match class {
            ServiceClass::Weekday => &self.weekday_service_id,
            ServiceClass::Weekend => &self.weekend_service_id,
            ServiceClass::Overnight => &self.overnight_service_id,
        }
    }

    /// The `service_id` static entries must carry to run at `at`
    pub fn active_service_id(&self, at: &NaiveDateTime) -> &str {
        self.service_id(self.service_class(at))
    }
}
