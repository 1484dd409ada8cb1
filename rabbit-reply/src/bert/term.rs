//! Decoding of reply bodies with [`eetf`].
//!
//! The body is scanned once before it is handed to the decoder. The
//! scan never allocates per term, and it refuses bodies whose counts
//! claim more terms than there are bytes, or that nest deeper than
//! [`MAX_DEPTH`]. Only those tags the management API sends are
//! accepted. Pids, ports, references, funs and compressed terms are
//! refused.
//!
//! Old brokers print floats as text. The scan rewrites those as IEEE
//! doubles, parsed here at full precision.

use std::borrow::Cow;

use bytes::Buf;
pub use eetf::Term;

/// First byte of every encoded term
pub const VERSION: u8 = 131;

/// Deepest nesting of tuples, lists and maps that will be decoded
pub const MAX_DEPTH: usize = 512;

/// Term tags
mod tag {
    /// IEEE 754 double, big-endian
    pub(super) const NEW_FLOAT: u8 = 70;
    /// Unsigned 8 bit integer
    pub(super) const SMALL_INTEGER: u8 = 97;
    /// Signed 32 bit integer
    pub(super) const INTEGER: u8 = 98;
    /// Float printed as text in 31 bytes
    pub(super) const FLOAT: u8 = 99;
    /// Latin-1 atom with a 16 bit length
    pub(super) const ATOM: u8 = 100;
    /// Tuple with an 8 bit arity
    pub(super) const SMALL_TUPLE: u8 = 104;
    /// Tuple with a 32 bit arity
    pub(super) const LARGE_TUPLE: u8 = 105;
    /// The empty list
    pub(super) const NIL: u8 = 106;
    /// List of bytes with a 16 bit length
    pub(super) const STRING: u8 = 107;
    /// List with a 32 bit length followed by its tail
    pub(super) const LIST: u8 = 108;
    /// Binary with a 32 bit length
    pub(super) const BINARY: u8 = 109;
    /// Bignum with an 8 bit digit count
    pub(super) const SMALL_BIG: u8 = 110;
    /// Bignum with a 32 bit digit count
    pub(super) const LARGE_BIG: u8 = 111;
    /// Latin-1 atom with an 8 bit length
    pub(super) const SMALL_ATOM: u8 = 115;
    /// Map with a 32 bit pair count
    pub(super) const MAP: u8 = 116;
    /// UTF-8 atom with a 16 bit length
    pub(super) const ATOM_UTF8: u8 = 118;
    /// UTF-8 atom with an 8 bit length
    pub(super) const SMALL_ATOM_UTF8: u8 = 119;
}

/// Bytes taken by a textual float after its tag
const TEXT_FLOAT_LEN: usize = 31;

/// Why a buffer could not be decoded as a term
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The buffer does not start with the version byte
    #[error("expected format version {VERSION}, found {0:?}")]
    Version(Option<u8>),

    /// The buffer ended inside a term
    #[error("input ended {needed} bytes early")]
    Truncated {
        /// How many more bytes the current term needs
        needed: usize,
    },

    /// A term type that the management API does not send
    #[error("unsupported term tag {0}")]
    UnsupportedTag(u8),

    /// A textual float that does not parse
    #[error("invalid float {0:?}")]
    InvalidFloat(String),

    /// Terms nested deeper than [`MAX_DEPTH`]
    #[error("terms are nested deeper than {MAX_DEPTH}")]
    TooDeep,

    /// Bytes left over after the term
    #[error("{0} trailing bytes after the term")]
    TrailingBytes(usize),

    /// Refused by the term decoder
    #[error(transparent)]
    Term(#[from] eetf::DecodeError),
}

/// Decode one complete term, including the leading version byte
///
/// # Errors
/// Fails if `body` is not exactly one supported term
pub fn decode(body: &[u8]) -> Result<Term, DecodeError> {
    let body = scan(body)?;
    Ok(Term::decode(body.as_ref())?)
}

/// Check that `body` holds one term within the limits. Returns the
/// body with textual floats rewritten, or `body` itself if it has none
fn scan(body: &[u8]) -> Result<Cow<'_, [u8]>, DecodeError> {
    let mut scanner = Scanner {
        buf: body,
        text_floats: Vec::new(),
    };
    match scanner.buf.first() {
        Some(&VERSION) => scanner.buf.advance(1),
        other => return Err(DecodeError::Version(other.copied())),
    }

    // terms still to read at each open level
    let mut pending = vec![1usize];
    while let Some(left) = pending.last_mut() {
        if *left == 0 {
            pending.pop();
            continue;
        }
        *left -= 1;
        let offset = body.len() - scanner.buf.remaining();
        let children = scanner.term(offset)?;
        if children == 0 {
            continue;
        }
        if pending.len() >= MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        // every term takes at least one byte
        if let Some(needed) = children.checked_sub(scanner.buf.remaining()) {
            if needed > 0 {
                return Err(DecodeError::Truncated { needed });
            }
        }
        pending.push(children);
    }
    if scanner.buf.has_remaining() {
        return Err(DecodeError::TrailingBytes(scanner.buf.remaining()));
    }

    if scanner.text_floats.is_empty() {
        return Ok(Cow::Borrowed(body));
    }
    let mut rewritten = Vec::with_capacity(body.len());
    let mut copied = 0;
    for (offset, value) in scanner.text_floats {
        rewritten.extend_from_slice(&body[copied..offset]);
        rewritten.push(tag::NEW_FLOAT);
        rewritten.extend_from_slice(&value.to_be_bytes());
        copied = offset + 1 + TEXT_FLOAT_LEN;
    }
    rewritten.extend_from_slice(&body[copied..]);
    Ok(Cow::Owned(rewritten))
}

/// Reads term headers from the front of a buffer
struct Scanner<'a> {
    /// Bytes not yet read
    buf: &'a [u8],
    /// Offset of each textual float and its value
    text_floats: Vec<(usize, f64)>,
}

impl<'a> Scanner<'a> {
    /// Fail unless `n` more bytes are available
    fn need(&self, n: usize) -> Result<(), DecodeError> {
        match n.checked_sub(self.buf.remaining()) {
            Some(needed) if needed > 0 => Err(DecodeError::Truncated { needed }),
            _ => Ok(()),
        }
    }

    /// Read one byte
    fn u8(&mut self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a big-endian `u16` length
    fn len16(&mut self) -> Result<usize, DecodeError> {
        self.need(2)?;
        Ok(usize::from(self.buf.get_u16()))
    }

    /// Read a big-endian `u32` length
    fn len32(&mut self) -> Result<usize, DecodeError> {
        self.need(4)?;
        Ok(usize::try_from(self.buf.get_u32()).unwrap_or(usize::MAX))
    }

    /// Read the next `n` bytes
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.need(n)?;
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    /// Read the tag and fixed part of the term at `offset`. Returns how
    /// many terms are nested directly inside it
    fn term(&mut self, offset: usize) -> Result<usize, DecodeError> {
        let children = match self.u8()? {
            tag::NEW_FLOAT => self.take(8).map(|_| 0)?,
            tag::SMALL_INTEGER => self.take(1).map(|_| 0)?,
            tag::INTEGER => self.take(4).map(|_| 0)?,
            tag::FLOAT => {
                let value = text_float(self.take(TEXT_FLOAT_LEN)?)?;
                self.text_floats.push((offset, value));
                0
            }
            tag::ATOM | tag::ATOM_UTF8 | tag::STRING => {
                let len = self.len16()?;
                self.take(len).map(|_| 0)?
            }
            tag::SMALL_ATOM | tag::SMALL_ATOM_UTF8 => {
                let len = usize::from(self.u8()?);
                self.take(len).map(|_| 0)?
            }
            tag::BINARY => {
                let len = self.len32()?;
                self.take(len).map(|_| 0)?
            }
            tag::SMALL_BIG => {
                let digits = usize::from(self.u8()?);
                self.take(digits.saturating_add(1)).map(|_| 0)?
            }
            tag::LARGE_BIG => {
                let digits = self.len32()?;
                self.take(digits.saturating_add(1)).map(|_| 0)?
            }
            tag::NIL => 0,
            tag::SMALL_TUPLE => usize::from(self.u8()?),
            tag::LARGE_TUPLE => self.len32()?,
            // elements and the tail
            tag::LIST => self.len32()?.saturating_add(1),
            tag::MAP => self.len32()?.saturating_mul(2),
            other => return Err(DecodeError::UnsupportedTag(other)),
        };
        Ok(children)
    }
}

/// Float from its old textual encoding, a NUL padded `%.20e`
fn text_float(text: &[u8]) -> Result<f64, DecodeError> {
    let printed = String::from_utf8_lossy(text);
    let printed = printed.trim_end_matches('\0').trim();
    printed
        .parse()
        .map_err(|_| DecodeError::InvalidFloat(printed.to_string()))
}

#[cfg(test)]
mod test {
    use eetf::{Atom, Binary, ByteList, FixInteger, Float, List, Map, Tuple};
    use proptest::prelude::*;

    use super::*;

    fn atom(name: &str) -> Term {
        Term::Atom(Atom {
            name: name.to_string(),
        })
    }

    #[test]
    fn scalars() {
        assert!(matches!(
            decode(&[131, 97, 200]),
            Ok(Term::FixInteger(FixInteger { value: 200 }))
        ));
        assert!(matches!(
            decode(&[131, 98, 0xff, 0xff, 0xff, 0xfe]),
            Ok(Term::FixInteger(FixInteger { value: -2 }))
        ));
        let mut float = vec![131, 70];
        float.extend_from_slice(&1.5f64.to_be_bytes());
        assert!(matches!(decode(&float), Ok(Term::Float(Float { value })) if value == 1.5));
        assert_eq!(
            decode(&[131, 100, 0, 4, b't', b'r', b'u', b'e']).ok(),
            Some(atom("true"))
        );
        assert_eq!(decode(&[131, 119, 2, 0xc3, 0xa9]).ok(), Some(atom("\u{e9}")));
        assert!(matches!(
            decode(&[131, 109, 0, 0, 0, 2, b'h', b'i']),
            Ok(Term::Binary(Binary { bytes })) if bytes == b"hi"
        ));
        assert!(matches!(
            decode(&[131, 107, 0, 3, 1, 2, 3]),
            Ok(Term::ByteList(ByteList { bytes })) if bytes == [1, 2, 3]
        ));
    }

    #[test]
    fn text_floats() {
        let mut printed = b"2.50000000000000000000e+01".to_vec();
        printed.resize(31, 0);

        let mut bytes = vec![131, 99];
        bytes.extend_from_slice(&printed);
        assert!(matches!(decode(&bytes), Ok(Term::Float(Float { value })) if value == 25.0));

        // {1.0e-1, 25.0}, rewritten in place next to other terms
        let mut bytes = vec![131, 104, 2, 99];
        let mut tenth = b"1.00000000000000005551e-01".to_vec();
        tenth.resize(31, 0);
        bytes.extend_from_slice(&tenth);
        bytes.push(99);
        bytes.extend_from_slice(&printed);
        let Ok(Term::Tuple(Tuple { elements })) = decode(&bytes) else {
            panic!("not a tuple: {:?}", decode(&bytes));
        };
        assert!(matches!(elements[0], Term::Float(Float { value }) if value == 0.1));
        assert!(matches!(elements[1], Term::Float(Float { value }) if value == 25.0));

        let mut bytes = vec![131, 99];
        bytes.extend_from_slice(&[b'x'; 31]);
        assert!(matches!(decode(&bytes), Err(DecodeError::InvalidFloat(_))));
    }

    #[test]
    fn bignums() {
        // 2^64, little-endian digits
        let bytes = [131, 110, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let Ok(Term::BigInteger(big)) = decode(&bytes) else {
            panic!("not a bignum");
        };
        assert_eq!(big.value.to_string(), "18446744073709551616");

        let bytes = [131, 111, 0, 0, 0, 1, 1, 5];
        let Ok(Term::BigInteger(big)) = decode(&bytes) else {
            panic!("not a bignum");
        };
        assert_eq!(big.value.to_string(), "-5");
    }

    #[test]
    fn containers() {
        // {struct, [{a, 1}]}
        let bytes = [
            131, 104, 2, 100, 0, 6, b's', b't', b'r', b'u', b'c', b't', 108, 0, 0, 0, 1, 104, 2,
            100, 0, 1, b'a', 97, 1, 106,
        ];
        let expected = Term::Tuple(Tuple {
            elements: vec![
                atom("struct"),
                Term::List(List {
                    elements: vec![Term::Tuple(Tuple {
                        elements: vec![atom("a"), Term::FixInteger(FixInteger { value: 1 })],
                    })],
                }),
            ],
        });
        assert_eq!(decode(&bytes).ok(), Some(expected));

        // #{k => []}
        let bytes = [131, 116, 0, 0, 0, 1, 100, 0, 1, b'k', 106];
        let expected = Term::Map(Map {
            entries: vec![(atom("k"), Term::List(List { elements: vec![] }))],
        });
        assert_eq!(decode(&bytes).ok(), Some(expected));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(decode(&[]), Err(DecodeError::Version(None))));
        assert!(matches!(decode(b"{}"), Err(DecodeError::Version(Some(b'{')))));
        assert!(matches!(
            decode(&[131, 109, 0, 0, 0, 5, b'a']),
            Err(DecodeError::Truncated { needed: 4 })
        ));
        assert!(matches!(
            decode(&[131, 97, 1, 2]),
            Err(DecodeError::TrailingBytes(1))
        ));
        // a pid
        assert!(matches!(
            decode(&[131, 88]),
            Err(DecodeError::UnsupportedTag(88))
        ));
        assert!(matches!(
            decode(&[131, 118, 0, 1, 0xff]),
            Err(DecodeError::Term(_))
        ));
    }

    #[test]
    fn deep_nesting_is_refused() {
        let mut bytes = vec![131];
        bytes.extend(std::iter::repeat([104, 1]).take(MAX_DEPTH).flatten());
        bytes.push(106);
        assert!(matches!(decode(&bytes), Err(DecodeError::TooDeep)));

        let mut bytes = vec![131];
        bytes.extend(std::iter::repeat([104, 1]).take(MAX_DEPTH - 1).flatten());
        bytes.push(106);
        assert!(decode(&bytes).is_ok());
    }

    #[test]
    fn huge_counts_are_refused_before_decoding() {
        let bytes = [131, 108, 0xff, 0xff, 0xff, 0xff, 106];
        assert!(matches!(decode(&bytes), Err(DecodeError::Truncated { .. })));
        let bytes = [131, 116, 0x7f, 0xff, 0xff, 0xff, 106];
        assert!(matches!(decode(&bytes), Err(DecodeError::Truncated { .. })));
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_never_panic(body in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut bytes = vec![VERSION];
            bytes.extend(body);
            let _ = decode(&bytes);
        }
    }
}
