/// Reference count of consumers sharing the one physical sensor.
///
/// `running` latches: it only turns on when a start raises the count from zero and
/// only turns off when a stop brings it back to zero.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    count: u32,
    running: bool,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer. Returns true when this start must arm the scheduler.
    pub fn start(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count == 1 && !self.running {
            self.running = true;
            return true;
        }
        false
    }

    /// Releases a consumer. Returns true when this stop must tear the scheduler down.
    /// Extra stops clamp at zero.
    pub fn stop(&mut self) -> bool {
        self.count = self.count.saturating_sub(1);
        if self.count == 0 && self.running {
            self.running = false;
            return true;
        }
        false
    }

    /// Drops every consumer at once. Returns whether the registry was running.
    pub fn reset(&mut self) -> bool {
        let was_running = self.running;
        self.count = 0;
        self.running = false;
        was_running
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
