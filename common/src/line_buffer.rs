#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    Overflow,
}

#[derive(Debug, Clone)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_len: usize,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len),
            max_len,
            overflowed: false,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<LineEvent> {
        if byte == b'\n' || byte == b'\r' {
            return self.finish_line();
        }

        if self.overflowed {
            return None;
        }

        if self.buf.len() >= self.max_len {
            self.buf.clear();
            self.overflowed = true;
            return None;
        }

        self.buf.push(byte);
        None
    }

    fn finish_line(&mut self) -> Option<LineEvent> {
        if self.overflowed {
            self.overflowed = false;
            return Some(LineEvent::Overflow);
        }

        if self.buf.is_empty() {
            return None;
        }

        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        Some(LineEvent::Line(line))
    }
}
