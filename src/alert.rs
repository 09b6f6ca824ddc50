use anyhow::Result;

use crate::event::DetectionEvent;

/// Receives each accepted defect as it is recorded.
///
/// Errors and panics raised here are contained by the session; they never
/// stop detection.
pub trait DefectObserver: Send {
    fn on_defect(&mut self, event: &DetectionEvent) -> Result<()>;
}

/// Operator alert written to the log.
#[derive(Debug, Default)]
pub struct LogAlertObserver {
    alerts: u64,
}

impl LogAlertObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alerts(&self) -> u64 {
        self.alerts
    }
}

pub fn alert_message(event: &DetectionEvent) -> String {
    format!(
        "{} detected at {:.2} meters!",
        event.defect_type(),
        event.position_meters()
    )
}

impl DefectObserver for LogAlertObserver {
    fn on_defect(&mut self, event: &DetectionEvent) -> Result<()> {
        self.alerts += 1;
        log::warn!(
            "[{}] sheet {}: {}",
            event.display_time(),
            event.sheet_id(),
            alert_message(event)
        );
        Ok(())
    }
}
