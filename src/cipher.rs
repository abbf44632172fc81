//! AES-ECB, PKCS#7 padding and MD5 key derivation.

use std::fmt;

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use openssl::hash::{hash, MessageDigest};

use crate::bytes::Bytes;

pub const BLOCK_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
	KeyLength(usize),
	DataLength(usize),
	Digest(String),
}

impl fmt::Display for CipherError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CipherError::KeyLength(len)  => write!(f, "incorrect AES key length ({len} bytes)"),
			CipherError::DataLength(len) => write!(f, "data length {len} is not a multiple of {BLOCK_SIZE}"),
			CipherError::Digest(msg)     => write!(f, "digest failed: {msg}"),
		}
	}
}

impl std::error::Error for CipherError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingError {
	InputLength(usize),
	PadLength(u8),
	PadBytes,
}

impl fmt::Display for PaddingError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PaddingError::InputLength(len) => write!(f, "input length {len} is not a positive multiple of the block size"),
			PaddingError::PadLength(pad)   => write!(f, "padding is incorrect (pad length {pad})"),
			PaddingError::PadBytes         => write!(f, "PKCS#7 padding is incorrect"),
		}
	}
}

impl std::error::Error for PaddingError {}

enum Aes {
	Aes128(aes::Aes128),
	Aes192(aes::Aes192),
	Aes256(aes::Aes256),
}

impl Aes {
	fn new(key: &[u8]) -> Result<Self, CipherError> {
		let invalid = |_| CipherError::KeyLength(key.len());
		match key.len() {
			16 => aes::Aes128::new_from_slice(key).map(Aes::Aes128).map_err(invalid),
			24 => aes::Aes192::new_from_slice(key).map(Aes::Aes192).map_err(invalid),
			32 => aes::Aes256::new_from_slice(key).map(Aes::Aes256).map_err(invalid),
			len => Err(CipherError::KeyLength(len)),
		}
	}

	fn decrypt_block(&self, block: &mut [u8]) {
		let block = GenericArray::from_mut_slice(block);
		match self {
			Aes::Aes128(c) => c.decrypt_block(block),
			Aes::Aes192(c) => c.decrypt_block(block),
			Aes::Aes256(c) => c.decrypt_block(block),
		}
	}

	fn encrypt_block(&self, block: &mut [u8]) {
		let block = GenericArray::from_mut_slice(block);
		match self {
			Aes::Aes128(c) => c.encrypt_block(block),
			Aes::Aes192(c) => c.encrypt_block(block),
			Aes::Aes256(c) => c.encrypt_block(block),
		}
	}
}

fn check_blocks(data: &[u8]) -> Result<(), CipherError> {
	if data.len() % BLOCK_SIZE != 0 {
		return Err(CipherError::DataLength(data.len()));
	}
	Ok(())
}

/// Decrypts every 16-byte block independently.
pub fn ecb_decrypt<K: AsRef<[u8]>, T: AsRef<[u8]>>(key: K, ciphertext: T) -> Result<Bytes, CipherError> {
	let ciphertext = ciphertext.as_ref();
	check_blocks(ciphertext)?;
	let aes = Aes::new(key.as_ref())?;

	let mut plaintext = ciphertext.to_vec();
	for block in plaintext.chunks_mut(BLOCK_SIZE) {
		aes.decrypt_block(block);
	}
	Ok(Bytes::from_vec(plaintext))
}

pub fn ecb_encrypt<K: AsRef<[u8]>, T: AsRef<[u8]>>(key: K, plaintext: T) -> Result<Bytes, CipherError> {
	let plaintext = plaintext.as_ref();
	check_blocks(plaintext)?;
	let aes = Aes::new(key.as_ref())?;

	let mut ciphertext = plaintext.to_vec();
	for block in ciphertext.chunks_mut(BLOCK_SIZE) {
		aes.encrypt_block(block);
	}
	Ok(Bytes::from_vec(ciphertext))
}

pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
	let pad = block_size - data.len() % block_size;
	let mut padded = Vec::with_capacity(data.len() + pad);
	padded.extend_from_slice(data);
	padded.resize(data.len() + pad, pad as u8);
	padded
}

pub fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<&[u8], PaddingError> {
	if data.is_empty() || data.len() % block_size != 0 {
		return Err(PaddingError::InputLength(data.len()));
	}

	let pad = data[data.len() - 1];
	if pad == 0 || pad as usize > block_size {
		return Err(PaddingError::PadLength(pad));
	}

	let (text, padding) = data.split_at(data.len() - pad as usize);
	if padding.iter().any(|&b| b != pad) {
		return Err(PaddingError::PadBytes);
	}
	Ok(text)
}

/// 128-bit MD5 digest of `text`, usable directly as an AES-128 key.
pub fn md5_key(text: &str) -> Result<[u8; 16], CipherError> {
	let digest = hash(MessageDigest::md5(), text.as_bytes())
		.map_err(|err| CipherError::Digest(err.to_string()))?;

	let mut key = [0; 16];
	key.copy_from_slice(&digest);
	Ok(key)
}
