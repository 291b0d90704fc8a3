use std::io::{self, Write};

use fswatch_stream::ChangeEvent;

/// Print one event as a single human-readable line on stdout.
///
/// Flushes after every line so piped consumers see events as they arrive.
pub fn print_event(event: &ChangeEvent) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    write_event(&mut stdout, event)?;
    stdout.flush()
}

fn write_event(out: &mut impl Write, event: &ChangeEvent) -> io::Result<()> {
    writeln!(out, "{event}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fswatch_stream::{EventFlags, decode};

    #[test]
    fn test_write_event_one_line_per_event() {
        let created = EventFlags::ITEM_IS_FILE | EventFlags::ITEM_CREATED;
        let removed = EventFlags::ITEM_IS_FILE | EventFlags::ITEM_REMOVED;
        let mut buf = Vec::new();
        let first = decode(1, "/tmp/a", created.bits());
        let second = decode(2, "/tmp/a", removed.bits());
        write_event(&mut buf, &first).unwrap();
        write_event(&mut buf, &second).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "/tmp/a: file created\n/tmp/a: file removed\n"
        );
    }
}
