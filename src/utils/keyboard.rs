//! Raw keyboard polling used while the operator plugs the biosensors.

use std::io::stdout;
use std::{process, time::Duration};

use crossterm::{
    cursor::{Hide, MoveToColumn, Show},
    event::{poll, read, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
    Result,
};

/// Key pressed by the operator when asked to confirm or cancel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Answer {
    Proceed,
    Cancel,
}

/// Blocks until the operator presses `Enter` (proceed) or `Esc` (cancel).
/// Any other key is ignored.
pub(crate) fn wait_for_answer() -> Result<Answer> {
    loop {
        if let Some(answer) = poll_answer()? {
            return Ok(answer);
        }
    }
}

fn poll_answer() -> Result<Option<Answer>> {
    enable_raw_mode()?;
    execute!(stdout(), Hide)?;
    let result = poll(Duration::from_millis(500));
    // Leave raw mode before looking at the result so that a polling error
    // does not leave the terminal unusable.
    execute!(stdout(), MoveToColumn(0), Show)?;
    disable_raw_mode()?;

    if !result? {
        return Ok(None);
    }

    // It's guaranteed that read() wont block if `poll` returns `Ok(true)`
    let event = read()?;
    if event == Event::Key(KeyCode::Esc.into()) {
        Ok(Some(Answer::Cancel))
    } else if event == Event::Key(KeyCode::Enter.into()) {
        Ok(Some(Answer::Proceed))
    } else if event
        == Event::Key(KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            code: KeyCode::Char('c'),
        })
    {
        // As we are in raw mode, Ctrl+C will be captured here as a key
        // event. Catch it and exit the process if that happens
        process::exit(130);
    } else {
        Ok(None)
    }
}
