use crate::errors::{RastroError, Result};

/// Completion reporting for long operations.
///
/// The callback receives a fraction in `[0, 1]` and a short message;
/// returning `false` aborts the surrounding operation with
/// [RastroError::UserCancelled].
pub struct Progress<'a> {
    callback: Option<Box<dyn FnMut(f64, &str) -> bool + 'a>>,
}

impl<'a> Progress<'a> {
    pub fn new(callback: impl FnMut(f64, &str) -> bool + 'a) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Reports nothing and never cancels.
    pub fn silent() -> Self {
        Self { callback: None }
    }

    pub fn report(&mut self, fraction: f64, message: &str) -> Result<()> {
        match &mut self.callback {
            Some(callback) => {
                if !callback(fraction.clamp(0.0, 1.0), message) {
                    Err(RastroError::UserCancelled)
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Progress<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_never_cancels() {
        let mut progress = Progress::silent();
        assert!(progress.report(0.5, "halfway").is_ok());
        assert!(progress.report(1.0, "done").is_ok());
    }

    #[test]
    fn callback_sees_clamped_fractions() {
        let mut seen = Vec::new();
        let mut progress = Progress::new(|fraction, _| {
            seen.push(fraction);
            true
        });
        progress.report(-0.5, "").unwrap();
        progress.report(0.5, "").unwrap();
        progress.report(2.0, "").unwrap();
        drop(progress);
        assert_eq!(seen, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn returning_false_cancels() {
        let mut progress = Progress::new(|fraction, _| fraction < 0.5);
        assert!(progress.report(0.1, "").is_ok());
        assert!(matches!(
            progress.report(0.9, ""),
            Err(RastroError::UserCancelled)
        ));
    }
}
