use std::fmt::Debug;

use bstr::BStr;

/// Opaque snapshot of a [`Cursor`] position.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CursorPosition {
    position: u32,
}

/// Position-tracking view over the input bytes.
///
/// Every matcher either succeeds (possibly consuming input) or fails and leaves
/// the position exactly where it was. Only [`Cursor::backtrack`] and the helpers
/// built on it ever move the position backwards.
pub struct Cursor<'a> {
    position: u32,
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Cursor<'a> {
        assert!(bytes.len() <= u32::MAX as usize, "Input is too large");
        Cursor { position: 0, bytes }
    }

    pub fn position(&self) -> usize {
        self.position as usize
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.position as usize..]
    }

    pub fn is_eof(&self) -> bool {
        debug_assert!(self.position as usize <= self.bytes.len());
        self.position as usize == self.bytes.len()
    }

    /// The most recently consumed byte.
    pub fn last_byte(&self) -> Option<u8> {
        match self.position {
            0 => None,
            p => Some(self.bytes[p as usize - 1]),
        }
    }

    pub fn save_position(&self) -> CursorPosition {
        CursorPosition {
            position: self.position,
        }
    }

    pub fn restore_position(&mut self, state: CursorPosition) {
        debug_assert!(
            state.position <= self.position,
            "Restoring forward. Mismatched save_position - restore_position pair?"
        );
        self.position = state.position;
    }

    /// Returns the current byte and advances, `None` at the end of input.
    pub fn take(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.position += 1;
        Some(byte)
    }

    pub fn peek(&self) -> Option<u8> {
        self.bytes.get(self.position as usize).copied()
    }

    pub fn match_byte(&mut self, byte: u8) -> bool {
        if self.peek() != Some(byte) {
            return false;
        }
        self.position += 1;
        true
    }

    /// Runs `op` and restores the position if it fails.
    pub fn backtrack(&mut self, op: impl FnOnce(&mut Self) -> bool) -> bool {
        let checkpoint = self.save_position();
        if op(self) {
            return true;
        }
        self.restore_position(checkpoint);
        false
    }

    /// Conjunction scope: a failure anywhere inside undoes everything `op` consumed.
    pub fn all(&mut self, op: impl FnOnce(&mut Self) -> bool) -> bool {
        self.backtrack(op)
    }

    /// Zero or more repetitions, always succeeds.
    pub fn star(&mut self, mut op: impl FnMut(&mut Self) -> bool) -> bool {
        loop {
            let before = self.position;
            if !self.backtrack(&mut op) {
                break;
            }
            // an iteration that matched nothing would repeat forever
            if self.position == before {
                break;
            }
        }
        true
    }

    /// One or more repetitions.
    #[must_use]
    pub fn plus(&mut self, mut op: impl FnMut(&mut Self) -> bool) -> bool {
        if !self.backtrack(&mut op) {
            return false;
        }
        self.star(op)
    }

    /// Zero or one occurrence, always succeeds.
    pub fn opt(&mut self, op: impl FnOnce(&mut Self) -> bool) -> bool {
        self.backtrack(op);
        true
    }

    /// Same as `backtrack`, documents that the closure is a grouping.
    #[must_use]
    pub fn group(&mut self, op: impl FnOnce(&mut Self) -> bool) -> bool {
        self.backtrack(op)
    }

    /// Negative lookahead, never consumes input.
    pub fn not(&mut self, op: impl FnOnce(&mut Self) -> bool) -> bool {
        let checkpoint = self.save_position();
        let matched = op(self);
        self.restore_position(checkpoint);
        !matched
    }

    /// Matches all of `bytes` or nothing.
    pub fn literal(&mut self, bytes: &[u8]) -> bool {
        if !self.remaining().starts_with(bytes) {
            return false;
        }
        self.position += bytes.len() as u32;
        true
    }

    pub fn range(&mut self, min: u8, max: u8) -> bool {
        match self.peek() {
            Some(byte) if (min..=max).contains(&byte) => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    pub fn start_of_line(&self) -> bool {
        matches!(self.last_byte(), None | Some(b'\n' | b'\r'))
    }

    pub fn end_of_stream(&self) -> bool {
        self.peek().is_none()
    }

    pub fn empty(&self) -> bool {
        true
    }

    /// Stands in for a grammar operator the generator does not compile.
    pub fn unsupported(&self, _operator: &'static str) -> bool {
        false
    }
}

impl Debug for Cursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.position)
            .field("remaining", &BStr::new(self.remaining()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Cursor;

    #[test]
    fn take_and_peek() {
        let mut c = Cursor::new(b"ab");
        assert_eq!(c.peek(), Some(b'a'));
        assert_eq!(c.take(), Some(b'a'));
        assert_eq!(c.take(), Some(b'b'));
        assert_eq!(c.take(), None);
        assert_eq!(c.peek(), None);
        assert_eq!(c.position(), 2);
    }

    #[test]
    fn literal_byte() {
        let mut c = Cursor::new(b"ab");
        assert!(c.match_byte(b'a'));
        assert_eq!(c.position(), 1);

        let mut c = Cursor::new(b"xb");
        assert!(!c.match_byte(b'a'));
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn atomic_literal() {
        let mut c = Cursor::new(&[0x41, 0x42, 0x00]);
        assert!(c.literal(&[0x41, 0x42]));
        assert_eq!(c.position(), 2);

        let mut c = Cursor::new(&[0x41, 0x00]);
        assert!(!c.literal(&[0x41, 0x42]));
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn byte_range() {
        let mut c = Cursor::new(b"m");
        assert!(c.range(b'a', b'z'));
        assert_eq!(c.position(), 1);

        let mut c = Cursor::new(b"A");
        assert!(!c.range(b'a', b'z'));
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn sequence_is_atomic() {
        let mut c = Cursor::new(b"ac");
        assert!(!c.all(|c| c.match_byte(b'a') && c.match_byte(b'b')));
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn subtract_uses_lookahead() {
        let lower_but_not_x =
            |c: &mut Cursor| c.all(|c| c.not(|c| c.match_byte(b'x')) && c.range(b'a', b'z'));

        let mut c = Cursor::new(b"x");
        assert!(!lower_but_not_x(&mut c));
        assert_eq!(c.position(), 0);

        let mut c = Cursor::new(b"m");
        assert!(lower_but_not_x(&mut c));
        assert_eq!(c.position(), 1);
    }

    #[test]
    fn repetition_boundaries() {
        let mut c = Cursor::new(b"");
        assert!(!c.plus(|c| c.match_byte(b' ')));
        assert!(c.star(|c| c.match_byte(b' ')));
        assert_eq!(c.position(), 0);

        let mut c = Cursor::new(b"   x");
        assert!(c.plus(|c| c.match_byte(b' ')));
        assert_eq!(c.position(), 3);

        let mut c = Cursor::new(b"   x");
        assert!(c.star(|c| c.match_byte(b' ')));
        assert_eq!(c.position(), 3);
    }

    #[test]
    fn star_stops_without_progress() {
        let mut c = Cursor::new(b"aab");
        assert!(c.star(|c| c.opt(|c| c.match_byte(b'a'))));
        assert_eq!(c.position(), 2);
    }

    #[test]
    fn star_keeps_only_whole_iterations() {
        let mut c = Cursor::new(b"ababa");
        assert!(c.star(|c| c.all(|c| c.match_byte(b'a') && c.match_byte(b'b'))));
        assert_eq!(c.position(), 4);
    }

    #[test]
    fn opt_never_fails() {
        let mut c = Cursor::new(b"b");
        assert!(c.opt(|c| c.match_byte(b'a')));
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn pseudo_terminals() {
        let mut c = Cursor::new(b"a\nb");
        assert!(c.start_of_line());
        assert!(c.match_byte(b'a'));
        assert!(!c.start_of_line());
        assert!(c.match_byte(b'\n'));
        assert!(c.start_of_line());
        assert!(!c.end_of_stream());
        assert!(c.match_byte(b'b'));
        assert!(c.end_of_stream());
        assert!(c.empty());
        assert_eq!(c.position(), 3);
    }

    #[test]
    fn unsupported_fails_in_place() {
        let c = Cursor::new(b"abc");
        assert!(!c.unsupported("(exclude)"));
        assert_eq!(c.position(), 0);
    }

    #[test]
    fn backtrack_restores_exactly() {
        let mut c = Cursor::new(b"abc");
        assert!(c.match_byte(b'a'));
        assert!(!c.backtrack(|c| c.match_byte(b'b') && c.match_byte(b'x')));
        assert_eq!(c.position(), 1);
        assert!(c.backtrack(|c| c.match_byte(b'b') && c.match_byte(b'c')));
        assert!(c.is_eof());
    }
}
