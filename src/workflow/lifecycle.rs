// ABOUTME: Start, stop and restart of an already provisioned service.
// ABOUTME: Services without a bound container are skipped.

use super::steps::{CONTAINER_ID, Gate, LoadContainer};
use super::{ServiceSpec, Workflows};
use crate::step::{RestartContainer, StartContainer, StopContainer};
use crate::task::Task;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Start,
    Stop,
    Restart,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Start => "start",
            Lifecycle::Stop => "stop",
            Lifecycle::Restart => "restart",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lifecycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Lifecycle::Start),
            "stop" => Ok(Lifecycle::Stop),
            "restart" => Ok(Lifecycle::Restart),
            other => Err(format!("unknown lifecycle action: {other}")),
        }
    }
}

impl Workflows {
    pub fn lifecycle(&self, service: &ServiceSpec, action: Lifecycle) -> Task {
        let mut task = self.task_for(action.as_str(), service);
        task.add_step(LoadContainer::new(
            self.storage.clone(),
            service.id.clone(),
            Gate::SkipUnlessBound,
        ));
        match action {
            Lifecycle::Start => task.add_step(StartContainer::new(CONTAINER_ID)),
            Lifecycle::Stop => task.add_step(StopContainer::new(CONTAINER_ID)),
            Lifecycle::Restart => task.add_step(RestartContainer::new(CONTAINER_ID)),
        }
        task
    }

    pub fn start(&self, service: &ServiceSpec) -> Task {
        self.lifecycle(service, Lifecycle::Start)
    }

    pub fn stop(&self, service: &ServiceSpec) -> Task {
        self.lifecycle(service, Lifecycle::Stop)
    }

    pub fn restart(&self, service: &ServiceSpec) -> Task {
        self.lifecycle(service, Lifecycle::Restart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_actions() {
        assert_eq!("restart".parse::<Lifecycle>(), Ok(Lifecycle::Restart));
        assert!("reload".parse::<Lifecycle>().is_err());
        assert_eq!(Lifecycle::Stop.to_string(), "stop");
    }
}
