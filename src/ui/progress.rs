use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

/// Byte-counting progress bar drawn on stderr.
pub struct Bar {
    bar: ProgressBar,
}

impl Bar {
    /// # Errors
    ///
    /// Returns an error if the bar template is rejected.
    pub fn new(total: u64, description: &str) -> Result<Self> {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
            .context("invalid progress template")?
            .progress_chars("●○ ");

        bar.set_style(style);
        bar.set_message(description.to_owned());

        Ok(Self { bar })
    }

    #[inline]
    pub fn add(&self, delta: u64) {
        self.bar.inc(delta);
    }

    #[cfg(test)]
    fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_with_message("done");
    }
}

impl Drop for Bar {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
