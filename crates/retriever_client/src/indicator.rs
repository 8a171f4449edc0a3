use std::io::{self, Write};

/// Where progress messages are shown while a request is in flight
pub trait Indicator: Send + Sync {
    fn show(&self, message: &str);
    fn clear(&self);
}

/// Single status line on stderr, erased when cleared
pub struct StderrIndicator;

impl Indicator for StderrIndicator {
    fn show(&self, message: &str) {
        let mut err = io::stderr().lock();
        let _ = write!(err, "\r{message}...");
        let _ = err.flush();
    }

    fn clear(&self) {
        let mut err = io::stderr().lock();
        let _ = write!(err, "\r\x1b[2K");
        let _ = err.flush();
    }
}

/// Shows nothing
pub struct Silent;

impl Indicator for Silent {
    fn show(&self, _message: &str) {}
    fn clear(&self) {}
}

/// Loading indicator that is cleared on drop, whatever the outcome.
pub struct Loading<'a> {
    indicator: &'a dyn Indicator,
}

impl<'a> Loading<'a> {
    pub fn start(indicator: &'a dyn Indicator, message: &str) -> Self {
        indicator.show(message);
        Self { indicator }
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.indicator.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct Recorder(pub Mutex<Vec<String>>);

    impl Indicator for Recorder {
        fn show(&self, message: &str) {
            self.0.lock().unwrap().push(format!("show:{message}"));
        }
        fn clear(&self) {
            self.0.lock().unwrap().push("clear".to_string());
        }
    }

    #[test]
    fn guard_clears_on_early_return() {
        fn fails(indicator: &dyn Indicator) -> Result<(), ()> {
            let _loading = Loading::start(indicator, "Searching");
            Err(())
        }

        let recorder = Recorder::default();
        assert!(fails(&recorder).is_err());
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["show:Searching".to_string(), "clear".to_string()]
        );
    }
}
