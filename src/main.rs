use std::fmt;

use clap::{Parser, Subcommand};

use ctf_key_recovery::bytes::{Bytes, HexError};
use ctf_key_recovery::sqrt_leak::{self, LeakError};
use ctf_key_recovery::{cipher, quartic};

#[derive(Parser, Debug)]
#[command(version, about = "Recovers CTF flags from brute-forced integer keys")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Find a^4 + b^4 = c^4 + d^4 + difference and decrypt with key a*b*c*d
	Quartic {
		/// Exclusive upper bound on every term
		#[arg(long, default_value_t = quartic::DEFAULT_BOUND)]
		bound: u32,
		#[arg(long, default_value_t = quartic::DEFAULT_DIFFERENCE)]
		difference: u64,
		/// Hex-encoded AES-ECB ciphertext
		#[arg(long, default_value = quartic::DEFAULT_CIPHERTEXT)]
		ciphertext: String,
		/// Which characters a recovered flag may contain
		#[arg(long, value_enum, default_value_t = quartic::Printable::Unicode)]
		printable: quartic::Printable,
	},
	/// Recover K from leaked decimals of sqrt(K) and decrypt with key md5(K)
	SqrtLeak {
		/// Leaked fractional digits of sqrt(K)
		#[arg(long, default_value = sqrt_leak::DEFAULT_LEAK)]
		leak: String,
		/// Hex-encoded AES-ECB ciphertext
		#[arg(long, default_value = sqrt_leak::DEFAULT_CIPHERTEXT)]
		ciphertext: String,
		#[arg(long, value_enum, default_value_t = sqrt_leak::Method::Both)]
		method: sqrt_leak::Method,
		/// Significant digits used when expanding sqrt(K)
		#[arg(long, default_value_t = sqrt_leak::DEFAULT_PRECISION)]
		precision: usize,
	},
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigError {
	Ciphertext(HexError),
	CiphertextLength(usize),
	Leak(LeakError),
	Bound(u32),
	Precision(usize),
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Ciphertext(err)       => write!(f, "invalid ciphertext: {err}"),
			ConfigError::CiphertextLength(len) => write!(f, "ciphertext length {len} is not a non-zero multiple of {}", cipher::BLOCK_SIZE),
			ConfigError::Leak(err)             => write!(f, "invalid leak: {err}"),
			ConfigError::Bound(bound)          => write!(f, "bound {bound} is above the maximum of {}", quartic::MAX_BOUND),
			ConfigError::Precision(precision)  => write!(f, "precision {precision} is below the minimum of {}", sqrt_leak::MIN_PRECISION),
		}
	}
}

impl std::error::Error for ConfigError {}

impl From<HexError> for ConfigError {
	fn from(err: HexError) -> Self {
		ConfigError::Ciphertext(err)
	}
}

impl From<LeakError> for ConfigError {
	fn from(err: LeakError) -> Self {
		ConfigError::Leak(err)
	}
}

fn parse_ciphertext(hstr: &str) -> Result<Bytes, ConfigError> {
	let ciphertext = Bytes::from_hex(hstr)?;
	if ciphertext.is_empty() || ciphertext.len() % cipher::BLOCK_SIZE != 0 {
		return Err(ConfigError::CiphertextLength(ciphertext.len()));
	}
	Ok(ciphertext)
}

fn quartic_config(bound: u32, difference: u64, ciphertext: &str, printable: quartic::Printable) -> Result<quartic::Config, ConfigError> {
	if bound > quartic::MAX_BOUND {
		return Err(ConfigError::Bound(bound));
	}
	Ok(quartic::Config {
		bound,
		difference,
		ciphertext: parse_ciphertext(ciphertext)?,
		printable,
	})
}

fn sqrt_leak_config(leak: &str, ciphertext: &str, method: sqrt_leak::Method, precision: usize) -> Result<sqrt_leak::Config, ConfigError> {
	if precision < sqrt_leak::MIN_PRECISION {
		return Err(ConfigError::Precision(precision));
	}
	Ok(sqrt_leak::Config {
		leak: sqrt_leak::Leak::parse(leak)?,
		ciphertext: parse_ciphertext(ciphertext)?,
		method,
		precision,
	})
}

fn run(command: Command) -> Result<bool, ConfigError> {
	let recovered = match command {
		Command::Quartic { bound, difference, ciphertext, printable } => {
			let config = quartic_config(bound, difference, &ciphertext, printable)?;
			println!("Starting quartic solver (bound {}, difference {})", config.bound, config.difference);
			quartic::run(&config).is_some()
		}
		Command::SqrtLeak { leak, ciphertext, method, precision } => {
			let config = sqrt_leak_config(&leak, &ciphertext, method, precision)?;
			println!("Starting square root leak solver");
			sqrt_leak::run(&config).is_some()
		}
	};
	Ok(recovered)
}

fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let cli = Cli::parse();
	match run(cli.command) {
		Ok(true) => {}
		Ok(false) => log::info!("No flag recovered"),
		Err(err) => {
			log::error!("{err}");
			std::process::exit(1);
		}
	}
}
