//! Search for `a^4 + b^4 = c^4 + d^4 + 17` and the AES-ECB flag keyed by `a*b*c*d`.

use std::fmt;

use indexmap::IndexMap;
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::bytes::Bytes;
use crate::cipher::{self, CipherError};

pub const DEFAULT_BOUND: u32 = 3000;
pub const DEFAULT_DIFFERENCE: u64 = 17;
pub const DEFAULT_CIPHERTEXT: &str = "41593455378fed8c3bd344827a193bde7ec2044a3f7a3ca6fb77448e9de55155";

/// Largest bound for which two fourth powers still fit in a `u64`.
pub const MAX_BOUND: u32 = 50_000;

pub type Pair = (u32, u32);

fn fourth(x: u32) -> u64 {
	let x = x as u64;
	x * x * x * x
}

/// Every sum `i^4 + j^4` with `1 <= i <= j < bound`, mapped to the pairs producing it.
pub struct FourthPowerIndex {
	sums: IndexMap<u64, Vec<Pair>>,
}

impl FourthPowerIndex {
	/// Panics if `bound` exceeds [`MAX_BOUND`].
	pub fn build(bound: u32) -> Self {
		assert!(bound <= MAX_BOUND, "bound {bound} overflows u64 sums");

		let mut sums: IndexMap<u64, Vec<Pair>> = IndexMap::new();
		for i in 1..bound {
			let i4 = fourth(i);
			for j in i..bound {
				sums.entry(i4 + fourth(j)).or_default().push((i, j));
			}
		}
		Self { sums }
	}

	pub fn len(&self) -> usize {
		self.sums.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sums.is_empty()
	}

	pub fn get(&self, sum: u64) -> Option<&[Pair]> {
		self.sums.get(&sum).map(Vec::as_slice)
	}

	pub fn iter(&self) -> impl Iterator<Item = (u64, &[Pair])> {
		self.sums.iter().map(|(&sum, pairs)| (sum, pairs.as_slice()))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Solution {
	pub a: u32,
	pub b: u32,
	pub c: u32,
	pub d: u32,
}

impl Solution {
	pub fn left(&self) -> u64 {
		fourth(self.a) + fourth(self.b)
	}

	pub fn right(&self) -> u64 {
		fourth(self.c) + fourth(self.d)
	}

	pub fn verify(&self, difference: u64) -> bool {
		self.left().checked_sub(self.right()) == Some(difference)
	}

	pub fn product(&self) -> u64 {
		[self.a, self.b, self.c, self.d].iter().map(|&x| x as u64).product()
	}

	/// Decimal product left-padded with zeros to 16 characters.
	pub fn key_material(&self) -> Vec<u8> {
		format!("{:0>16}", self.product()).into_bytes()
	}
}

impl fmt::Display for Solution {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "a={}, b={}, c={}, d={}", self.a, self.b, self.c, self.d)
	}
}

pub fn find_solutions(index: &FourthPowerIndex, difference: u64) -> Vec<Solution> {
	let mut solutions = Vec::new();
	for (sum, pairs1) in index.iter() {
		let Some(pairs2) = sum.checked_sub(difference).and_then(|s| index.get(s)) else {
			continue;
		};

		for &(a, b) in pairs1 {
			for &(c, d) in pairs2 {
				let solution = Solution { a, b, c, d };
				if !solution.verify(difference) {
					log::warn!("Discarding {solution}: sums do not differ by {difference}");
					continue;
				}
				log::info!("Found solution: {solution}");
				log::debug!("{}^4 + {}^4 = {}", a, b, solution.left());
				log::debug!("{}^4 + {}^4 + {} = {}", c, d, difference, solution.right() + difference);
				solutions.push(solution);
			}
		}
	}
	solutions
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagError {
	Cipher(CipherError),
	Undecodable,
}

impl fmt::Display for FlagError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FlagError::Cipher(err)  => write!(f, "{err}"),
			FlagError::Undecodable => write!(f, "could not decode as UTF-8"),
		}
	}
}

impl std::error::Error for FlagError {}

impl From<CipherError> for FlagError {
	fn from(err: CipherError) -> Self {
		FlagError::Cipher(err)
	}
}

/// Interprets decrypted bytes as text: NUL-stripped UTF-8, then with the
/// trailing `last byte` bytes removed.
pub fn decode_plaintext(plaintext: &[u8]) -> Result<String, FlagError> {
	if let Ok(text) = std::str::from_utf8(plaintext) {
		return Ok(text.trim_end_matches('\0').to_owned());
	}

	let pad = *plaintext.last().ok_or(FlagError::Undecodable)? as usize;
	if pad == 0 || pad > plaintext.len() {
		return Err(FlagError::Undecodable);
	}
	let text = std::str::from_utf8(&plaintext[..plaintext.len() - pad]).map_err(|_| FlagError::Undecodable)?;
	log::debug!("Decoded after removing {pad} bytes of padding");
	Ok(text.to_owned())
}

pub fn decrypt_flag(solution: &Solution, ciphertext: &Bytes) -> Result<String, FlagError> {
	let key = solution.key_material();
	println!("Key: {}", String::from_utf8_lossy(&key));

	let decrypted = cipher::ecb_decrypt(&key, ciphertext)?;
	log::debug!("Decrypted (raw): {:?}", decrypted.to_string());
	log::debug!("Decrypted (hex): {}", decrypted.to_hex());
	decode_plaintext(decrypted.as_ref())
}

/// Acceptance test for a decoded flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Printable {
	/// Only printable ASCII (0x20..=0x7e).
	Ascii,
	/// Any character outside the Unicode Other (C*) and Separator (Z*) categories, plus the ASCII space.
	Unicode,
}

impl Printable {
	pub fn accepts(self, text: &str) -> bool {
		if text.is_empty() {
			return false;
		}
		match self {
			Printable::Ascii => text.bytes().all(|b| (0x20..=0x7e).contains(&b)),
			Printable::Unicode => text.chars().all(|c| c == ' ' || is_printable(c)),
		}
	}
}

fn is_printable(c: char) -> bool {
	use GeneralCategory::*;
	!matches!(get_general_category(c),
		Control | Format | Surrogate | PrivateUse | Unassigned |
		SpaceSeparator | LineSeparator | ParagraphSeparator)
}

pub struct Config {
	pub bound: u32,
	pub difference: u64,
	pub ciphertext: Bytes,
	pub printable: Printable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
	pub solution: Solution,
	pub flag: String,
}

pub fn run(config: &Config) -> Option<Recovered> {
	log::info!("Building fourth powers index below {}...", config.bound);
	let index = FourthPowerIndex::build(config.bound);
	log::info!("Generated {} unique sums", index.len());

	log::info!("Searching for solutions...");
	let solutions = find_solutions(&index, config.difference);
	if solutions.is_empty() {
		println!("No solutions found!");
		return None;
	}

	println!("Found {} solution(s)!", solutions.len());
	for (i, solution) in solutions.iter().enumerate() {
		println!("--- Trying solution {}: {} ---", i + 1, solution);
		match decrypt_flag(solution, &config.ciphertext) {
			Ok(flag) if config.printable.accepts(&flag) => {
				println!("SUCCESS! Flag found: {flag}");
				return Some(Recovered { solution: *solution, flag });
			}
			Ok(flag) => log::warn!("Decrypted text is not printable: {flag:?}"),
			Err(err) => log::warn!("Solution {solution} failed: {err}"),
		}
	}

	println!("None of the solutions produced a printable flag");
	None
}
