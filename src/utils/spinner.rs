//! Progress feedback while waiting on the toolchain or on a biosensor.

use indicatif::{ProgressBar, ProgressStyle};

/// Creates a ticking spinner with the `[HK]` prefix.
pub(crate) fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.enable_steady_tick(120);
    pb.set_style(
        ProgressStyle::default_spinner()
            // For more spinners check out the cli-spinners project:
            // https://github.com/sindresorhus/cli-spinners/blob/master/spinners.json
            .tick_strings(&["⠋", "⠙", "⠚", "⠞", "⠖", "⠦", "⠴", "⠲", "⠳", "⠓"])
            .template("[HK] {spinner:.blue} {msg}"),
    );
    pb.set_message(message.into());
    pb
}
