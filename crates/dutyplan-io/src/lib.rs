//! # dutyplan-io
//!
//! Pure text codecs for the Untis-style exchange formats:
//! - [`gpu001`]: lesson-timetable ingestion (one lesson per line)
//! - [`gpu009`]: duty-roster export (one line per slot and teacher)
//!
//! Both modules are free of I/O and store dependencies; callers feed
//! strings in and move records between the codec and the store.

pub mod gpu001;
pub mod gpu009;

pub use gpu001::{parse_gpu001, ParsedLesson, ParseStats};
pub use gpu009::{render_gpu009, DutyLine};
