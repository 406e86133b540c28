//! Transaction wire format, compilation and signing.
//!
//! ```text
//! Transaction:
//!   num_signatures          compact-u16
//!   signatures              64 bytes * num_signatures
//!   message:
//!     num_required_sigs     u8
//!     num_readonly_signed   u8
//!     num_readonly_unsigned u8
//!     num_accounts          compact-u16
//!     account_keys          32 bytes * num_accounts
//!     recent_blockhash      32 bytes
//!     num_instructions      compact-u16
//!     instructions[]        program index u8, accounts (compact-u16 + u8s), data (compact-u16 + bytes)
//! ```

use base64::Engine;
use ed25519_dalek::Verifier;

use crate::ledger::types::{Hash, LedgerError, LedgerResult, Pubkey, Signature};
use crate::ledger::wallet::Keypair;

/// Encode a `u16` in the ledger's compact-u16 format (1 to 3 bytes).
pub fn encode_compact_u16(value: u16, out: &mut Vec<u8>) {
    let mut val = value as u32;
    loop {
        let mut byte = (val & 0x7f) as u8;
        val >>= 7;
        if val > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if val == 0 {
            break;
        }
    }
}

fn encode_len(len: usize, out: &mut Vec<u8>) -> LedgerResult<()> {
    let len = u16::try_from(len)
        .map_err(|_| LedgerError::Encoding(format!("length {} exceeds compact-u16", len)))?;
    encode_compact_u16(len, out);
    Ok(())
}

/// An account referenced by an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A program invocation before compilation into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// An instruction with account references replaced by key indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// The signed portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
    /// Canonical order: writable signers (fee payer first), read-only
    /// signers, writable non-signers, read-only non-signers.
    pub account_keys: Vec<Pubkey>,
    pub recent_blockhash: Hash,
    pub instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compile instructions into a message paid for by `fee_payer`.
    pub fn compile(
        instructions: &[Instruction],
        fee_payer: &Pubkey,
        recent_blockhash: Hash,
    ) -> LedgerResult<Self> {
        struct Entry {
            pubkey: Pubkey,
            is_signer: bool,
            is_writable: bool,
        }

        let mut entries: Vec<Entry> = Vec::new();
        let mut upsert = |pubkey: Pubkey, signer: bool, writable: bool| {
            if let Some(entry) = entries.iter_mut().find(|e| e.pubkey == pubkey) {
                entry.is_signer |= signer;
                entry.is_writable |= writable;
            } else {
                entries.push(Entry {
                    pubkey,
                    is_signer: signer,
                    is_writable: writable,
                });
            }
        };

        upsert(*fee_payer, true, true);
        for ix in instructions {
            for meta in &ix.accounts {
                upsert(meta.pubkey, meta.is_signer, meta.is_writable);
            }
            upsert(ix.program_id, false, false);
        }

        // Stable sort keeps the fee payer ahead of other writable signers.
        entries.sort_by_key(|e| match (e.is_signer, e.is_writable) {
            (true, true) => 0u8,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        });

        if entries.len() > u8::MAX as usize {
            return Err(LedgerError::Encoding(format!(
                "{} accounts exceed the per-message limit",
                entries.len()
            )));
        }

        let count = |f: fn(&Entry) -> bool| entries.iter().filter(|e| f(*e)).count() as u8;
        let num_required_signatures = count(|e| e.is_signer);
        let num_readonly_signed = count(|e| e.is_signer && !e.is_writable);
        let num_readonly_unsigned = count(|e| !e.is_signer && !e.is_writable);

        let account_keys: Vec<Pubkey> = entries.iter().map(|e| e.pubkey).collect();
        let index_of = |key: &Pubkey| -> LedgerResult<u8> {
            account_keys
                .iter()
                .position(|k| k == key)
                .map(|i| i as u8)
                .ok_or_else(|| LedgerError::Encoding(format!("account {} not in message", key)))
        };

        let mut compiled = Vec::with_capacity(instructions.len());
        for ix in instructions {
            compiled.push(CompiledInstruction {
                program_id_index: index_of(&ix.program_id)?,
                accounts: ix
                    .accounts
                    .iter()
                    .map(|meta| index_of(&meta.pubkey))
                    .collect::<LedgerResult<Vec<u8>>>()?,
                data: ix.data.clone(),
            });
        }

        Ok(Self {
            num_required_signatures,
            num_readonly_signed,
            num_readonly_unsigned,
            account_keys,
            recent_blockhash,
            instructions: compiled,
        })
    }

    /// The fee payer, always the first account key.
    pub fn fee_payer(&self) -> Option<&Pubkey> {
        self.account_keys.first()
    }

    /// Keys whose signatures the message requires, in signature-slot order.
    pub fn signer_keys(&self) -> &[Pubkey] {
        let n = (self.num_required_signatures as usize).min(self.account_keys.len());
        &self.account_keys[..n]
    }

    pub fn is_writable(&self, index: usize) -> bool {
        let signers = self.num_required_signatures as usize;
        if index < signers {
            index < signers.saturating_sub(self.num_readonly_signed as usize)
        } else {
            index < self.account_keys.len().saturating_sub(self.num_readonly_unsigned as usize)
        }
    }

    /// Expand compiled instructions back into account metas.
    pub fn decompile(&self) -> LedgerResult<Vec<Instruction>> {
        let key = |index: u8| -> LedgerResult<Pubkey> {
            self.account_keys
                .get(index as usize)
                .copied()
                .ok_or_else(|| LedgerError::Encoding(format!("account index {} out of range", index)))
        };
        let signers = self.num_required_signatures as usize;

        self.instructions
            .iter()
            .map(|ix| {
                let accounts = ix
                    .accounts
                    .iter()
                    .map(|&i| {
                        Ok(AccountMeta {
                            pubkey: key(i)?,
                            is_signer: (i as usize) < signers,
                            is_writable: self.is_writable(i as usize),
                        })
                    })
                    .collect::<LedgerResult<Vec<_>>>()?;
                Ok(Instruction {
                    program_id: key(ix.program_id_index)?,
                    accounts,
                    data: ix.data.clone(),
                })
            })
            .collect()
    }

    /// Serialize the message; these are the bytes that get signed.
    pub fn serialize(&self) -> LedgerResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(256);
        buf.push(self.num_required_signatures);
        buf.push(self.num_readonly_signed);
        buf.push(self.num_readonly_unsigned);

        encode_len(self.account_keys.len(), &mut buf)?;
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_bytes());
        }

        buf.extend_from_slice(self.recent_blockhash.as_bytes());

        encode_len(self.instructions.len(), &mut buf)?;
        for ix in &self.instructions {
            buf.push(ix.program_id_index);
            encode_len(ix.accounts.len(), &mut buf)?;
            buf.extend_from_slice(&ix.accounts);
            encode_len(ix.data.len(), &mut buf)?;
            buf.extend_from_slice(&ix.data);
        }

        Ok(buf)
    }
}

/// A message plus one signature slot per required signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub signatures: Vec<Signature>,
    pub message: Message,
}

impl Transaction {
    /// Wrap a message with empty signature slots.
    pub fn new_unsigned(message: Message) -> Self {
        Self {
            signatures: vec![Signature::default(); message.num_required_signatures as usize],
            message,
        }
    }

    /// Fill the signature slots belonging to `keypairs`.
    ///
    /// Slots for other signers are left untouched, so the transaction can be
    /// handed to another party to complete.
    pub fn partial_sign(&mut self, keypairs: &[&Keypair]) -> LedgerResult<()> {
        let bytes = self.message.serialize()?;
        for keypair in keypairs {
            let pubkey = keypair.pubkey();
            let slot = self
                .message
                .signer_keys()
                .iter()
                .position(|k| *k == pubkey)
                .ok_or_else(|| {
                    LedgerError::Encoding(format!("{} is not a required signer", pubkey))
                })?;
            self.signatures[slot] = keypair.sign_message(&bytes);
        }
        Ok(())
    }

    /// Sign with every required key; fails if any slot stays empty.
    pub fn sign(&mut self, keypairs: &[&Keypair]) -> LedgerResult<()> {
        self.partial_sign(keypairs)?;
        if !self.is_signed() {
            return Err(LedgerError::Encoding(
                "transaction is missing required signatures".into(),
            ));
        }
        Ok(())
    }

    /// Whether every signature slot has been filled.
    pub fn is_signed(&self) -> bool {
        self.signatures.iter().all(|s| *s != Signature::default())
    }

    /// Check every signature against its signer key.
    pub fn verify(&self) -> bool {
        let Ok(bytes) = self.message.serialize() else {
            return false;
        };
        let signers = self.message.signer_keys();
        if signers.len() != self.signatures.len() {
            return false;
        }
        signers.iter().zip(&self.signatures).all(|(key, sig)| {
            let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(key.as_bytes()) else {
                return false;
            };
            let signature = ed25519_dalek::Signature::from_bytes(sig.as_bytes());
            verifying_key.verify(&bytes, &signature).is_ok()
        })
    }

    /// The transaction id: the fee payer's signature.
    pub fn signature(&self) -> Signature {
        self.signatures.first().copied().unwrap_or_default()
    }

    /// Serialize into the wire format.
    pub fn serialize(&self) -> LedgerResult<Vec<u8>> {
        let message = self.message.serialize()?;
        let mut wire = Vec::with_capacity(3 + 64 * self.signatures.len() + message.len());
        encode_len(self.signatures.len(), &mut wire)?;
        for sig in &self.signatures {
            wire.extend_from_slice(sig.as_bytes());
        }
        wire.extend_from_slice(&message);
        Ok(wire)
    }

    /// Base64 wire form as accepted by `sendTransaction`.
    pub fn to_base64(&self) -> LedgerResult<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.serialize()?))
    }
}
