//! Recovery of `K` in `[10^10, 10^11]` from leaked fractional digits of `sqrt(K)`,
//! followed by AES-ECB decryption under `md5(K)`.

use std::fmt;
use std::ops::RangeInclusive;

use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::bytes::{self, Bytes};
use crate::cipher::{self, CipherError, PaddingError, BLOCK_SIZE};

pub const DEFAULT_LEAK: &str = "4336282047950153046404";
pub const DEFAULT_CIPHERTEXT: &str = "7863c63a4bb2c782eb67f32928a1deceaee0259d096b192976615fba644558b2ef62e48740f7f28da587846a81697745";

pub const MIN_K: u64 = 10_000_000_000;
pub const MAX_K: u64 = 100_000_000_000;

/// Significant digits used when expanding `sqrt(K)`.
pub const DEFAULT_PRECISION: usize = 150;
pub const MIN_PRECISION: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeakError {
	Empty,
	NotADigit(char),
}

impl fmt::Display for LeakError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LeakError::Empty         => write!(f, "leak is empty"),
			LeakError::NotADigit(c) => write!(f, "leak contains non-digit {c:?}"),
		}
	}
}

impl std::error::Error for LeakError {}

/// Leaked digits `L`, read as the fraction `0.L`.
#[derive(Debug, Clone)]
pub struct Leak {
	digits: String,
	value: BigUint,
	scale: BigUint,
}

impl Leak {
	pub fn parse(digits: &str) -> Result<Self, LeakError> {
		let digits = digits.trim();
		if digits.is_empty() {
			return Err(LeakError::Empty);
		}
		if let Some(c) = digits.chars().find(|c| !c.is_ascii_digit()) {
			return Err(LeakError::NotADigit(c));
		}

		let value = BigUint::parse_bytes(digits.as_bytes(), 10).ok_or(LeakError::Empty)?;
		Ok(Self {
			digits: digits.to_owned(),
			value,
			scale: pow10(digits.len()),
		})
	}

	pub fn digits(&self) -> &str {
		&self.digits
	}

	pub fn len(&self) -> usize {
		self.digits.len()
	}

	pub fn is_empty(&self) -> bool {
		self.digits.is_empty()
	}

	fn prefix(&self, len: usize) -> &str {
		&self.digits[..len.min(self.digits.len())]
	}

	/// `round((n + 0.L)^2)`, computed exactly.
	pub fn square_with(&self, n: u64) -> BigUint {
		let x = BigUint::from(n) * &self.scale + &self.value;
		let denominator = &self.scale * &self.scale;
		let half = &denominator >> 1u32;
		(x.pow(2) + half) / denominator
	}
}

fn pow10(exp: usize) -> BigUint {
	BigUint::from(10u32).pow(exp as u32)
}

/// Fractional digits of `sqrt(k)` when written with `precision` significant
/// digits, the last one rounded to nearest, or `None` when `k` is a perfect
/// square or the integer part alone uses up the precision.
pub fn sqrt_fraction(k: u64, precision: usize) -> Option<String> {
	sqrt_digits(k, precision, true)
}

fn sqrt_digits(k: u64, precision: usize, round: bool) -> Option<String> {
	let k = BigUint::from(k);
	let root = k.sqrt();
	if &root * &root == k {
		return None;
	}

	let integer_digits = root.to_string().len();
	let fraction_digits = precision.checked_sub(integer_digits).filter(|&d| d > 0)?;
	let scale = pow10(fraction_digits);
	let radicand = k * &scale * &scale;
	let mut scaled = radicand.sqrt();
	// sqrt(k) is irrational here, so it is never exactly halfway
	if round && (radicand << 2u32) > (&scaled * 2u32 + 1u32).pow(2) {
		scaled += 1u32;
	}

	let mut fraction = scaled - &root * &scale;
	// a carry into the integer part leaves an all-zero fraction
	if fraction == scale {
		fraction = BigUint::from(0u32);
	}
	Some(format!("{:0>width$}", fraction.to_string(), width = fraction_digits))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
	pub n: u64,
	pub k: u64,
	pub fraction: String,
	/// Every leaked digit matched, not just the acceptance prefix.
	pub exact: bool,
}

/// Tests the integer part `n`: returns the candidate if `K = round((n + 0.L)^2)`
/// is in range and `sqrt(K)` starts with the first `prefix_digits` leaked digits.
pub fn candidate_for(n: u64, leak: &Leak, prefix_digits: usize, precision: usize) -> Option<Candidate> {
	let k = leak.square_with(n).to_u64()?;
	if !(MIN_K..=MAX_K).contains(&k) {
		return None;
	}

	let wanted = leak.prefix(prefix_digits);
	// truncated, so its digits are a prefix of every longer expansion
	let quick = sqrt_digits(k, (integer_digits(k) + wanted.len().max(1)).min(precision), false)?;
	if !quick.starts_with(wanted) {
		return None;
	}

	let fraction = sqrt_fraction(k, precision)?;
	if !fraction.starts_with(wanted) {
		return None;
	}
	let exact = fraction.starts_with(leak.digits());
	Some(Candidate { n, k, fraction, exact })
}

fn integer_digits(k: u64) -> usize {
	BigUint::from(k).sqrt().to_string().len()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptError {
	Cipher(CipherError),
	Padding(PaddingError),
}

impl fmt::Display for DecryptError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DecryptError::Cipher(err)  => write!(f, "{err}"),
			DecryptError::Padding(err) => write!(f, "{err}"),
		}
	}
}

impl std::error::Error for DecryptError {}

impl From<CipherError> for DecryptError {
	fn from(err: CipherError) -> Self {
		DecryptError::Cipher(err)
	}
}

impl From<PaddingError> for DecryptError {
	fn from(err: PaddingError) -> Self {
		DecryptError::Padding(err)
	}
}

/// Decrypts with `md5(decimal K)` as the key and strips PKCS#7 padding.
pub fn decrypt_flag(k: u64, ciphertext: &Bytes) -> Result<String, DecryptError> {
	let key = cipher::md5_key(&k.to_string())?;
	let decrypted = cipher::ecb_decrypt(key, ciphertext)?;
	let unpadded = cipher::pkcs7_unpad(decrypted.as_ref(), BLOCK_SIZE)?;
	Ok(bytes::decode_utf8_ignoring_invalid(unpadded))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
	pub name: &'static str,
	pub ranges: Vec<RangeInclusive<u64>>,
	/// Leaked digits that must match for a candidate to be tried.
	pub prefix_digits: usize,
	pub progress_step: u64,
}

impl SearchPlan {
	/// Every integer part `sqrt(K)` can have.
	pub fn mathematical() -> Self {
		Self {
			name: "mathematical",
			ranges: vec![100_000..=316_227],
			prefix_digits: 10,
			progress_step: 20_000,
		}
	}

	/// Five slices of the full range with a stricter match.
	pub fn targeted() -> Self {
		Self {
			name: "targeted",
			ranges: vec![
				100_000..=120_000,
				150_000..=170_000,
				200_000..=220_000,
				250_000..=270_000,
				300_000..=316_227,
			],
			prefix_digits: 15,
			progress_step: 5_000,
		}
	}

	fn total(&self) -> u64 {
		self.ranges.iter().map(|r| r.end().saturating_sub(*r.start()) + 1).sum()
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
	pub k: u64,
	pub flag: String,
}

#[derive(Debug, Default)]
pub struct SearchReport {
	pub candidates: Vec<Candidate>,
	pub recovered: Option<Recovered>,
}

pub fn search(plan: &SearchPlan, leak: &Leak, ciphertext: &Bytes, precision: usize) -> SearchReport {
	log::info!("Running {} search for sqrt(K) = n + 0.{}", plan.name, leak.digits());

	let total = plan.total().max(1);
	let mut tested = 0u64;
	let mut report = SearchReport::default();
	for range in &plan.ranges {
		log::info!("Testing range n = {} to {}", range.start(), range.end());

		for n in range.clone() {
			tested += 1;
			if plan.progress_step > 0 && n % plan.progress_step == 0 {
				log::info!("Progress: {:.1}% (n = {})", tested as f64 / total as f64 * 100.0, n);
			}

			let Some(candidate) = candidate_for(n, leak, plan.prefix_digits, precision) else {
				continue;
			};
			println!("CANDIDATE FOUND! n = {}, K = {}", candidate.n, candidate.k);
			log::info!("Actual decimal: {}...", &candidate.fraction[..candidate.fraction.len().min(50)]);
			if candidate.exact {
				println!("EXACT MATCH confirmed!");
			}

			let k = candidate.k;
			report.candidates.push(candidate);
			match decrypt_flag(k, ciphertext) {
				Ok(flag) => {
					println!("DECRYPTION SUCCESS! FLAG = {flag}");
					report.recovered = Some(Recovered { k, flag });
					return report;
				}
				Err(err) => log::warn!("Decryption failed for K = {k}: {err}; continuing search"),
			}
		}
	}

	println!("Search completed. Found {} candidates total.", report.candidates.len());
	for candidate in &report.candidates {
		println!("K = {}, n = {}, decimal = {}...", candidate.k, candidate.n, &candidate.fraction[..candidate.fraction.len().min(30)]);
	}
	report
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Method {
	Mathematical,
	Targeted,
	/// Mathematical first, targeted only if that recovers nothing.
	Both,
}

impl Method {
	fn plans(self) -> Vec<SearchPlan> {
		match self {
			Method::Mathematical => vec![SearchPlan::mathematical()],
			Method::Targeted     => vec![SearchPlan::targeted()],
			Method::Both         => vec![SearchPlan::mathematical(), SearchPlan::targeted()],
		}
	}
}

pub struct Config {
	pub leak: Leak,
	pub ciphertext: Bytes,
	pub method: Method,
	pub precision: usize,
}

pub fn run(config: &Config) -> Option<Recovered> {
	println!("Leak: {} ({} digits)", config.leak.digits(), config.leak.len());
	println!("Ciphertext: {}", config.ciphertext.to_hex());

	for plan in config.method.plans() {
		let report = search(&plan, &config.leak, &config.ciphertext, config.precision);
		if let Some(recovered) = report.recovered {
			println!("SOLUTION FOUND! K = {}, FLAG = {}", recovered.k, recovered.flag);
			return Some(recovered);
		}
		log::info!("The {} search did not recover the flag", plan.name);
	}

	println!("No solution found.");
	None
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use rand::Rng;

	fn plan(range: RangeInclusive<u64>, prefix_digits: usize) -> SearchPlan {
		SearchPlan { name: "test", ranges: vec![range], prefix_digits, progress_step: 0 }
	}

	/// First `digits` fractional digits of `sqrt(k)`, truncated.
	fn leak_of(k: u64, digits: usize) -> Leak {
		Leak::parse(&sqrt_digits(k, DEFAULT_PRECISION, false).unwrap()[..digits]).unwrap()
	}

	fn encrypt_flag(k: u64, flag: &str) -> Bytes {
		let key = cipher::md5_key(&k.to_string()).unwrap();
		cipher::ecb_encrypt(key, cipher::pkcs7_pad(flag.as_bytes(), BLOCK_SIZE)).unwrap()
	}

	#[test]
	fn leak_parsing() {
		assert_eq!(Leak::parse("").unwrap_err(), LeakError::Empty);
		assert_eq!(Leak::parse("12a4").unwrap_err(), LeakError::NotADigit('a'));
		assert_eq!(Leak::parse("0042").unwrap().digits(), "0042");
	}

	#[test]
	fn square_rounds_to_nearest() {
		let leak = Leak::parse("5").unwrap();
		// 2.5^2 = 6.25
		assert_eq!(leak.square_with(2), BigUint::from(6u32));
		let leak = Leak::parse("75").unwrap();
		// 2.75^2 = 7.5625
		assert_eq!(leak.square_with(2), BigUint::from(8u32));
	}

	#[test]
	fn known_expansion() {
		// sqrt(12345678901) = 111111.110610055554...
		let fraction = sqrt_fraction(12_345_678_901, 30).unwrap();
		assert_eq!(fraction.len(), 24);
		assert!(fraction.starts_with("1106100555"), "{fraction}");
		assert_eq!(sqrt_fraction(10_000_000_000, 150), None);
		assert_eq!(sqrt_fraction(2, 1), None);
		assert_eq!(sqrt_fraction(2, 5).unwrap(), "4142");
	}

	#[test]
	fn last_digit_is_rounded() {
		// sqrt(3) = 1.7320508...
		assert_eq!(sqrt_fraction(3, 5).unwrap(), "7321");
		assert_eq!(sqrt_digits(3, 5, false).unwrap(), "7320");
		// sqrt(99) = 9.9498743...
		assert_eq!(sqrt_fraction(99, 3).unwrap(), "95");
		// sqrt(99.9999...) carries into the integer part
		assert_eq!(sqrt_fraction(9_999_999_999, 6).unwrap(), "0");
	}

	#[test]
	fn zero_leading_fraction_is_padded() {
		// sqrt(10000000001) = 100000.0000049999999999875...
		assert_eq!(sqrt_fraction(10_000_000_001, 20).unwrap(), "00000500000000");
		assert_eq!(sqrt_digits(10_000_000_001, 20, false).unwrap(), "00000499999999");
	}

	#[test]
	fn out_of_range_k_is_never_a_candidate() {
		// sqrt(5000000000) = 70710.678..., below the K range
		let leak = leak_of(5_000_000_000, 35);
		assert_eq!(candidate_for(70_710, &leak, 10, DEFAULT_PRECISION), None);
		// sqrt(200000000000) = 447213.595..., above it
		let leak = leak_of(200_000_000_000, 34);
		assert_eq!(candidate_for(447_213, &leak, 10, DEFAULT_PRECISION), None);
	}

	#[test]
	fn range_bounds_are_inclusive() {
		let leak = Leak::parse("0").unwrap();
		// perfect squares at both ends have no fractional digits
		assert_eq!(leak.square_with(100_000).to_u64(), Some(MIN_K));
		assert_eq!(candidate_for(100_000, &leak, 1, DEFAULT_PRECISION), None);

		let leak = leak_of(MAX_K, 34);
		let candidate = candidate_for(316_227, &leak, 10, DEFAULT_PRECISION).unwrap();
		assert_eq!(candidate.k, MAX_K);
		assert!(candidate.exact);
	}

	#[test]
	fn challenge_leak() {
		let leak = Leak::parse(DEFAULT_LEAK).unwrap();
		let ciphertext = Bytes::from_hex(DEFAULT_CIPHERTEXT).unwrap();

		let candidate = candidate_for(204_064, &leak, 15, DEFAULT_PRECISION).unwrap();
		assert_eq!(candidate.k, 41_642_293_072);
		// the leak is rounded in its last digit
		assert!(!candidate.exact);

		let report = search(&plan(204_000..=204_100, 10), &leak, &ciphertext, DEFAULT_PRECISION);
		assert_eq!(report.candidates.len(), 1);
		assert_eq!(report.recovered, Some(Recovered { k: 41_642_293_072, flag: "uiuctf{SQu4Re_Ro0T5_AR3nT_R4nD0M}".to_owned() }));
	}

	#[test]
	fn wrong_key_is_a_padding_failure() {
		let ciphertext = encrypt_flag(12_345_678_901, "flag{elsewhere}");
		assert!(matches!(decrypt_flag(12_345_678_902, &ciphertext), Err(DecryptError::Padding(_))));
		assert!(matches!(decrypt_flag(12_345_678_901, &Bytes::from_vec(vec![0; 5])), Err(DecryptError::Cipher(CipherError::DataLength(5)))));
		assert_eq!(decrypt_flag(12_345_678_901, &ciphertext).unwrap(), "flag{elsewhere}");
	}

	#[test]
	fn failed_candidates_do_not_stop_the_search() {
		let k = 12_345_678_901;
		let leak = leak_of(k, 24);
		let ciphertext = encrypt_flag(k + 1, "flag{unreachable}");

		let report = search(&plan(111_100..=111_120, 10), &leak, &ciphertext, DEFAULT_PRECISION);
		assert_eq!(report.candidates.iter().map(|c| c.k).collect::<Vec<_>>(), vec![k]);
		assert_eq!(report.recovered, None);
	}

	#[test]
	fn recovers_random_synthetic_k() {
		let mut rng = rand::thread_rng();
		for _ in 0..4 {
			let k = rng.gen_range(MIN_K..MAX_K);
			let n = BigUint::from(k).sqrt().to_u64().unwrap();
			if n * n == k {
				continue;
			}
			let leak = leak_of(k, 30);
			let ciphertext = encrypt_flag(k, "flag{square_roots}");

			let report = search(&plan(n - 3..=n + 3, 15), &leak, &ciphertext, DEFAULT_PRECISION);
			assert_eq!(report.recovered, Some(Recovered { k, flag: "flag{square_roots}".to_owned() }));
			assert!(report.candidates[0].exact);
			assert_eq!(report.candidates[0].n, n);
		}
	}

	#[test]
	fn plans_cover_expected_ranges() {
		let full = SearchPlan::mathematical();
		assert_eq!(full.total(), 216_228);
		let targeted = SearchPlan::targeted();
		assert_eq!(targeted.ranges.len(), 5);
		assert!(targeted.ranges.iter().all(|r| full.ranges[0].contains(r.start()) && full.ranges[0].contains(r.end())));
		assert!(targeted.prefix_digits > full.prefix_digits);
	}

	proptest! {
		#[test]
		fn decryption_round_trip(k in MIN_K..=MAX_K) {
			let ciphertext = encrypt_flag(k, "flag{deterministic}");
			prop_assert_eq!(decrypt_flag(k, &ciphertext).unwrap(), "flag{deterministic}");
			prop_assert_eq!(decrypt_flag(k, &ciphertext).unwrap(), decrypt_flag(k, &ciphertext).unwrap());
		}
	}
}
