use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexError {
	InvalidCharacter,
	OddLength,
}

impl fmt::Display for HexError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			HexError::InvalidCharacter => write!(f, "invalid hex character"),
			HexError::OddLength        => write!(f, "odd number of hex digits"),
		}
	}
}

impl std::error::Error for HexError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bytes {
	bytes: Vec<u8>,
}

impl Bytes {
	pub fn from_vec(bytes: Vec<u8>) -> Self {
		Self { bytes }
	}

	pub fn from_hex(hstr: &str) -> Result<Self, HexError> {
		hex::decode(hstr.trim()).map_err(|err| match err {
			hex::FromHexError::InvalidHexCharacter {..} => HexError::InvalidCharacter,
			hex::FromHexError::OddLength |
			hex::FromHexError::InvalidStringLength      => HexError::OddLength,
		}).map(Self::from_vec)
	}

	pub fn len(&self) -> usize {
		self.bytes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.bytes.is_empty()
	}

	pub fn to_hex(&self) -> String {
		hex::encode(&self.bytes)
	}

	pub fn to_string(&self) -> String {
		String::from_utf8_lossy(&self.bytes).into_owned()
	}
}

impl AsRef<[u8]> for Bytes {
	fn as_ref(&self) -> &[u8] {
		&self.bytes
	}
}

/// Decodes UTF-8, dropping every invalid sequence instead of substituting U+FFFD.
pub fn decode_utf8_ignoring_invalid(mut bytes: &[u8]) -> String {
	let mut out = String::with_capacity(bytes.len());
	loop {
		match std::str::from_utf8(bytes) {
			Ok(valid) => {
				out.push_str(valid);
				return out;
			}
			Err(err) => {
				let (valid, rest) = bytes.split_at(err.valid_up_to());
				// valid_up_to() marks a prefix that is known to be UTF-8
				out.push_str(std::str::from_utf8(valid).unwrap_or_default());
				match err.error_len() {
					Some(skip) => bytes = &rest[skip..],
					None => return out,
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hex_decoding() {
		let bs = Bytes::from_hex("41593455378fed8c").unwrap();
		assert_eq!(bs.len(), 8);
		assert_eq!(bs.to_hex(), "41593455378fed8c");
		assert_eq!(Bytes::from_hex("abc"), Err(HexError::OddLength));
		assert_eq!(Bytes::from_hex("zz"), Err(HexError::InvalidCharacter));
	}

	#[test]
	fn invalid_utf8_is_dropped() {
		assert_eq!(decode_utf8_ignoring_invalid(b"fl\xffag\xc3"), "flag");
		assert_eq!(decode_utf8_ignoring_invalid("caf\u{e9}".as_bytes()), "caf\u{e9}");
		assert_eq!(decode_utf8_ignoring_invalid(b""), "");
	}
}
