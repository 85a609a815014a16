use std::io::{self, BufRead, Write};

/// The streams a machine talks to: program input, program output and the
/// diagnostic stream used for core dumps.
#[derive(Debug)]
pub struct Console<R, W, E> {
    pub input: R,
    pub output: W,
    pub error: E,
}

impl<R: BufRead, W: Write, E: Write> Console<R, W, E> {
    pub fn new(input: R, output: W, error: E) -> Self {
        Self {
            input,
            output,
            error,
        }
    }

    /// Reads a single byte, `None` at the end of input.
    ///
    /// Pending output is flushed first so prompts show up before blocking.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.output.flush()?;
        next_byte(&mut self.input)
    }

    /// Reads a signed decimal integer after skipping leading whitespace.
    ///
    /// Returns `None` at the end of input or when no digit follows the
    /// optional sign. The first character that is not part of the number is
    /// left in the input. Overflowing values wrap, which keeps them correct
    /// modulo 256.
    pub fn read_integer(&mut self) -> io::Result<Option<i64>> {
        self.output.flush()?;

        while let Some(byte) = peek_byte(&mut self.input)? {
            if !is_space(byte) {
                break;
            }
            self.input.consume(1);
        }

        let negative = match peek_byte(&mut self.input)? {
            Some(sign @ b'-') | Some(sign @ b'+') => {
                self.input.consume(1);
                sign == b'-'
            }
            _ => false,
        };

        let mut value: Option<i64> = None;
        while let Some(byte) = peek_byte(&mut self.input)? {
            if !byte.is_ascii_digit() {
                break;
            }
            self.input.consume(1);
            let digit = i64::from(byte - b'0');
            value = Some(value.unwrap_or(0).wrapping_mul(10).wrapping_add(digit));
        }

        Ok(value.map(|value| if negative { value.wrapping_neg() } else { value }))
    }

    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.write_all(&[byte])
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.output.flush()?;
        self.error.flush()
    }
}

/// Looks at the next byte without consuming it.
pub fn peek_byte<R: BufRead>(input: &mut R) -> io::Result<Option<u8>> {
    Ok(input.fill_buf()?.first().copied())
}

/// Consumes the next byte.
pub fn next_byte<R: BufRead>(input: &mut R) -> io::Result<Option<u8>> {
    let byte = peek_byte(input)?;
    if byte.is_some() {
        input.consume(1);
    }
    Ok(byte)
}

// Whitespace as skipped by the integer reader, vertical tab included
fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::Result;

    fn console(input: &[u8]) -> Console<&[u8], Vec<u8>, Vec<u8>> {
        Console::new(input, Vec::new(), Vec::new())
    }

    #[test]
    fn test_read_byte() -> Result<()> {
        let mut console = console(b"ab");
        assert_eq!(console.read_byte()?, Some(b'a'));
        assert_eq!(console.read_byte()?, Some(b'b'));
        assert_eq!(console.read_byte()?, None);

        Ok(())
    }

    #[test]
    fn test_read_integer() -> Result<()> {
        let mut console = console(b"  42\n-7 +3");
        assert_eq!(console.read_integer()?, Some(42));
        assert_eq!(console.read_integer()?, Some(-7));
        assert_eq!(console.read_integer()?, Some(3));
        assert_eq!(console.read_integer()?, None);

        Ok(())
    }

    #[test]
    fn test_read_integer_leaves_garbage() -> Result<()> {
        let mut console = console(b" x1");
        assert_eq!(console.read_integer()?, None);
        assert_eq!(console.read_byte()?, Some(b'x'));
        assert_eq!(console.read_integer()?, Some(1));

        Ok(())
    }

    #[test]
    fn test_read_integer_stops_at_non_digit() -> Result<()> {
        let mut console = console(b"12ab");
        assert_eq!(console.read_integer()?, Some(12));
        assert_eq!(console.read_byte()?, Some(b'a'));

        Ok(())
    }

    #[test]
    fn test_write_byte() -> Result<()> {
        let mut console = console(b"");
        console.write_byte(b'h')?;
        console.write_byte(b'i')?;
        assert_eq!(console.output, b"hi");

        Ok(())
    }
}
