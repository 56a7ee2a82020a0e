//! Thin terminal I/O helpers. Treated as a black box by the core spec
//! (spec.md §1): a line-reader that yields one line at a time from stdin,
//! and a printer that emits one line to stdout.

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub struct LineReader {
    lines: Lines<BufReader<Stdin>>,
}

impl LineReader {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

pub fn print_line(line: &str) {
    println!("{line}");
}
