//! @acp:module "Output Sink"
//! @acp:summary "Standard output routing with scoped in-memory capture"
//! @acp:domain cli
//! @acp:layer service
//!
//! Everything the CLI prints to standard output goes through [`write_str`]
//! (usually via the `outln!` macro). While a [`Capture`] is alive the text
//! lands in its buffer instead of the terminal. Captures nest; dropping one
//! always restores the previous sink.

use std::cell::RefCell;
use std::io::Write;

/// Default capture ceiling for bridged commands (64 KiB)
pub const DEFAULT_CAPTURE_LIMIT: usize = 64 * 1024;

struct Frame {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Write text to the active sink
pub fn write_str(text: &str) {
    let captured = FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        match frames.last_mut() {
            Some(frame) if frame.truncated => true,
            Some(frame) => {
                let room = frame.limit.saturating_sub(frame.buf.len());
                let mut end = text.len().min(room);
                if end < text.len() {
                    frame.truncated = true;
                    while !text.is_char_boundary(end) {
                        end -= 1;
                    }
                }
                frame.buf.extend_from_slice(&text.as_bytes()[..end]);
                true
            }
            None => false,
        }
    });
    if !captured {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout (e.g. `pig ... | head`) is not worth failing over
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

/// Write a line to the active sink
pub fn write_line(text: &str) {
    let mut line = String::with_capacity(text.len() + 1);
    line.push_str(text);
    line.push('\n');
    write_str(&line);
}

/// True while at least one capture is active
pub fn is_capturing() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Text collected by a finished capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub text: String,
    pub truncated: bool,
}

/// @acp:summary "Scoped redirection of standard output into memory"
#[must_use = "output is captured only while the guard is alive"]
pub struct Capture {
    depth: usize,
    finished: bool,
}

impl Capture {
    /// Start capturing, keeping at most `limit` bytes
    pub fn start(limit: usize) -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(Frame {
                buf: Vec::new(),
                limit,
                truncated: false,
            });
            frames.len()
        });
        Self {
            depth,
            finished: false,
        }
    }

    /// Stop capturing and hand back what was collected
    pub fn finish(mut self) -> Captured {
        self.finished = true;
        match self.pop() {
            Some(frame) => Captured {
                text: String::from_utf8_lossy(&frame.buf).into_owned(),
                truncated: frame.truncated,
            },
            None => Captured::default(),
        }
    }

    fn pop(&self) -> Option<Frame> {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            // Frames opened inside this one and leaked by a panic go with it
            if frames.len() >= self.depth {
                frames.truncate(self.depth);
                frames.pop()
            } else {
                None
            }
        })
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Run `f` with standard output captured
pub fn capture<F, R>(limit: usize, f: F) -> (R, Captured)
where
    F: FnOnce() -> R,
{
    let guard = Capture::start(limit);
    let value = f();
    (value, guard.finish())
}

/// Print a line to the active output sink
#[macro_export]
macro_rules! outln {
    () => {
        $crate::output::sink::write_str("\n")
    };
    ($($arg:tt)*) => {
        $crate::output::sink::write_line(&format!($($arg)*))
    };
}

/// Print to the active output sink without a newline
#[macro_export]
macro_rules! out {
    ($($arg:tt)*) => {
        $crate::output::sink::write_str(&format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_collects_output() {
        let ((), captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            crate::outln!("hello {}", "world");
            crate::out!("no newline");
        });
        assert_eq!(captured.text, "hello world\nno newline");
        assert!(!captured.truncated);
        assert!(!is_capturing());
    }

    #[test]
    fn test_capture_truncates_at_limit() {
        let ((), captured) = capture(5, || write_str("0123456789"));
        assert_eq!(captured.text, "01234");
        assert!(captured.truncated);
    }

    #[test]
    fn test_truncation_keeps_whole_characters() {
        let ((), captured) = capture(5, || {
            write_str("abcd€");
            write_str("x");
        });
        assert_eq!(captured.text, "abcd");
        assert!(captured.truncated);
    }

    #[test]
    fn test_nested_captures_are_independent() {
        let (inner, outer) = capture(DEFAULT_CAPTURE_LIMIT, || {
            write_str("outer-1 ");
            let ((), inner) = capture(DEFAULT_CAPTURE_LIMIT, || write_str("inner"));
            write_str("outer-2");
            inner
        });
        assert_eq!(inner.text, "inner");
        assert_eq!(outer.text, "outer-1 outer-2");
    }

    #[test]
    fn test_capture_restored_after_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = Capture::start(DEFAULT_CAPTURE_LIMIT);
            write_str("lost");
            panic!("legacy command blew up");
        });
        assert!(result.is_err());
        assert!(!is_capturing());
    }
}
