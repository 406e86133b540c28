//! Instruction builders and account layouts for the programs the console uses:
//! the system program, the token program and the associated token account
//! program.

use sha2::{Digest, Sha256};

use crate::ledger::transaction::{AccountMeta, Instruction};
use crate::ledger::types::{LedgerError, LedgerResult, Pubkey};

/// `11111111111111111111111111111111`
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new_from_array([0u8; 32]);

/// `TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    0x06, 0xdd, 0xf6, 0xe1, 0xd7, 0x65, 0xa1, 0x93, 0xd9, 0xcb, 0xe1, 0x46, 0xce, 0xeb, 0x79, 0xac,
    0x1c, 0xb4, 0x85, 0xed, 0x5f, 0x5b, 0x37, 0x91, 0x3a, 0x8c, 0xf5, 0x85, 0x7e, 0xff, 0x00, 0xa9,
]);

/// `ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL`
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    0x8c, 0x97, 0x25, 0x8f, 0x4e, 0x24, 0x89, 0xf1, 0xbb, 0x3d, 0x10, 0x29, 0x14, 0x8e, 0x0d, 0x83,
    0x0b, 0x5a, 0x13, 0x99, 0xda, 0xff, 0x10, 0x84, 0x04, 0x8e, 0x7b, 0xd8, 0xdb, 0xe9, 0xf8, 0x59,
]);

/// Size of a mint account.
pub const MINT_ACCOUNT_LEN: usize = 82;

/// Size of a token account.
pub const TOKEN_ACCOUNT_LEN: usize = 165;

const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Token program instruction tags.
pub mod token_instruction {
    pub const MINT_TO: u8 = 7;
    pub const TRANSFER: u8 = 3;
    pub const INITIALIZE_MINT2: u8 = 20;
}

/// Associated token account program instruction tags.
pub mod ata_instruction {
    pub const CREATE_IDEMPOTENT: u8 = 1;
}

/// System program `CreateAccount` tag (u32 LE).
pub const SYSTEM_CREATE_ACCOUNT: u32 = 0;

/// System `CreateAccount`: fund `new_account` and assign it to `owner`.
pub fn create_account(
    payer: &Pubkey,
    new_account: &Pubkey,
    lamports: u64,
    space: u64,
    owner: &Pubkey,
) -> Instruction {
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(&SYSTEM_CREATE_ACCOUNT.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner.as_bytes());

    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*payer, true),
            AccountMeta::writable(*new_account, true),
        ],
        data,
    }
}

/// Token `InitializeMint2`.
pub fn initialize_mint2(
    mint: &Pubkey,
    mint_authority: &Pubkey,
    freeze_authority: Option<&Pubkey>,
    decimals: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(67);
    data.push(token_instruction::INITIALIZE_MINT2);
    data.push(decimals);
    data.extend_from_slice(mint_authority.as_bytes());
    match freeze_authority {
        Some(key) => {
            data.push(1);
            data.extend_from_slice(key.as_bytes());
        }
        None => data.push(0),
    }

    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![AccountMeta::writable(*mint, false)],
        data,
    }
}

/// Token `MintTo`: `amount` raw units into `destination`.
pub fn mint_to(mint: &Pubkey, destination: &Pubkey, authority: &Pubkey, amount: u64) -> Instruction {
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*mint, false),
            AccountMeta::writable(*destination, false),
            AccountMeta::readonly(*authority, true),
        ],
        data: amount_data(token_instruction::MINT_TO, amount),
    }
}

/// Token `Transfer` between two token accounts of the same mint.
pub fn transfer(source: &Pubkey, destination: &Pubkey, owner: &Pubkey, amount: u64) -> Instruction {
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*source, false),
            AccountMeta::writable(*destination, false),
            AccountMeta::readonly(*owner, true),
        ],
        data: amount_data(token_instruction::TRANSFER, amount),
    }
}

fn amount_data(tag: u8, amount: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(9);
    data.push(tag);
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

/// Associated token account `CreateIdempotent`; a no-op if the account exists.
pub fn create_associated_token_account_idempotent(
    payer: &Pubkey,
    owner: &Pubkey,
    mint: &Pubkey,
) -> LedgerResult<Instruction> {
    let ata = get_associated_token_address(owner, mint)?;
    Ok(Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::writable(*payer, true),
            AccountMeta::writable(ata, false),
            AccountMeta::readonly(*owner, false),
            AccountMeta::readonly(*mint, false),
            AccountMeta::readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ata_instruction::CREATE_IDEMPOTENT],
    })
}

/// Deterministic token account address for `(owner, mint)`.
pub fn get_associated_token_address(owner: &Pubkey, mint: &Pubkey) -> LedgerResult<Pubkey> {
    find_program_address(
        &[owner.as_bytes(), TOKEN_PROGRAM_ID.as_bytes(), mint.as_bytes()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _bump)| address)
}

/// First bump, from 255 down, whose derived address is off the ed25519 curve.
pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> LedgerResult<(Pubkey, u8)> {
    for bump in (0u8..=255).rev() {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update([bump]);
        hasher.update(program_id.as_bytes());
        hasher.update(PDA_MARKER);
        let hash: [u8; 32] = hasher.finalize().into();

        if !is_on_curve(&hash) {
            return Ok((Pubkey::new_from_array(hash), bump));
        }
    }
    Err(LedgerError::InvalidAddress(
        "no viable bump seed for program address".into(),
    ))
}

pub fn is_on_curve(bytes: &[u8; 32]) -> bool {
    curve25519_dalek::edwards::CompressedEdwardsY(*bytes)
        .decompress()
        .is_some()
}

/// Decoded mint account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintLayout {
    pub mint_authority: Option<Pubkey>,
    pub supply: u64,
    pub decimals: u8,
    pub is_initialized: bool,
    pub freeze_authority: Option<Pubkey>,
}

fn read_u64(data: &[u8], offset: usize) -> LedgerResult<u64> {
    data.get(offset..offset + 8)
        .and_then(|b| b.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| LedgerError::Encoding(format!("account data too short for u64 at {}", offset)))
}

fn read_coption_key(data: &[u8], offset: usize) -> LedgerResult<Option<Pubkey>> {
    let tag = data
        .get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| LedgerError::Encoding("account data too short for option tag".into()))?;
    if tag == 0 {
        return Ok(None);
    }
    let key: [u8; 32] = data
        .get(offset + 4..offset + 36)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| LedgerError::Encoding("account data too short for key".into()))?;
    Ok(Some(Pubkey::new_from_array(key)))
}

/// Decode an 82-byte mint account.
pub fn unpack_mint(data: &[u8]) -> LedgerResult<MintLayout> {
    if data.len() != MINT_ACCOUNT_LEN {
        return Err(LedgerError::Encoding(format!(
            "mint account must be {} bytes, got {}",
            MINT_ACCOUNT_LEN,
            data.len()
        )));
    }
    Ok(MintLayout {
        mint_authority: read_coption_key(data, 0)?,
        supply: read_u64(data, 36)?,
        decimals: data[44],
        is_initialized: data[45] != 0,
        freeze_authority: read_coption_key(data, 46)?,
    })
}

/// Encode a mint account; the inverse of [`unpack_mint`].
pub fn pack_mint(layout: &MintLayout) -> Vec<u8> {
    let mut data = vec![0u8; MINT_ACCOUNT_LEN];
    write_coption_key(&mut data[0..36], layout.mint_authority.as_ref());
    data[36..44].copy_from_slice(&layout.supply.to_le_bytes());
    data[44] = layout.decimals;
    data[45] = layout.is_initialized as u8;
    write_coption_key(&mut data[46..82], layout.freeze_authority.as_ref());
    data
}

fn write_coption_key(out: &mut [u8], key: Option<&Pubkey>) {
    if let Some(key) = key {
        out[0..4].copy_from_slice(&1u32.to_le_bytes());
        out[4..36].copy_from_slice(key.as_bytes());
    }
}

/// Decoded fields of a token account that the console reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountLayout {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub is_initialized: bool,
}

/// Decode a 165-byte token account.
pub fn unpack_token_account(data: &[u8]) -> LedgerResult<TokenAccountLayout> {
    if data.len() != TOKEN_ACCOUNT_LEN {
        return Err(LedgerError::Encoding(format!(
            "token account must be {} bytes, got {}",
            TOKEN_ACCOUNT_LEN,
            data.len()
        )));
    }
    let key_at = |offset: usize| {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&data[offset..offset + 32]);
        Pubkey::new_from_array(bytes)
    };
    Ok(TokenAccountLayout {
        mint: key_at(0),
        owner: key_at(32),
        amount: read_u64(data, 64)?,
        is_initialized: data[108] != 0,
    })
}

/// Encode an initialized token account; the inverse of [`unpack_token_account`].
pub fn pack_token_account(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
    let mut data = vec![0u8; TOKEN_ACCOUNT_LEN];
    data[0..32].copy_from_slice(mint.as_bytes());
    data[32..64].copy_from_slice(owner.as_bytes());
    data[64..72].copy_from_slice(&amount.to_le_bytes());
    data[108] = 1;
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    #[test]
    fn test_program_ids_decode() {
        assert_eq!(
            TOKEN_PROGRAM_ID.to_string(),
            "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
        );
        assert_eq!(
            ASSOCIATED_TOKEN_PROGRAM_ID.to_string(),
            "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL"
        );
        assert_eq!(
            SYSTEM_PROGRAM_ID.to_string(),
            "11111111111111111111111111111111"
        );
    }

    #[test]
    fn test_create_account_data() {
        let ix = create_account(&key(1), &key(2), 1_461_600, 82, &TOKEN_PROGRAM_ID);
        assert_eq!(ix.data.len(), 52);
        assert_eq!(&ix.data[0..4], &[0, 0, 0, 0]);
        assert_eq!(u64::from_le_bytes(ix.data[4..12].try_into().unwrap()), 1_461_600);
        assert_eq!(u64::from_le_bytes(ix.data[12..20].try_into().unwrap()), 82);
        assert_eq!(&ix.data[20..52], TOKEN_PROGRAM_ID.as_bytes());
        assert!(ix.accounts.iter().all(|m| m.is_signer && m.is_writable));
    }

    #[test]
    fn test_initialize_mint2_data() {
        let authority = key(3);
        let ix = initialize_mint2(&key(2), &authority, Some(&authority), 9);
        assert_eq!(ix.data[0], 20);
        assert_eq!(ix.data[1], 9);
        assert_eq!(&ix.data[2..34], authority.as_bytes());
        assert_eq!(ix.data[34], 1);
        assert_eq!(ix.data.len(), 67);

        let no_freeze = initialize_mint2(&key(2), &authority, None, 0);
        assert_eq!(no_freeze.data.len(), 35);
        assert_eq!(no_freeze.data[34], 0);
    }

    #[test]
    fn test_amount_instructions() {
        let mint_ix = mint_to(&key(1), &key(2), &key(3), 500);
        assert_eq!(mint_ix.data[0], 7);
        assert_eq!(u64::from_le_bytes(mint_ix.data[1..9].try_into().unwrap()), 500);
        assert!(mint_ix.accounts[2].is_signer);
        assert!(!mint_ix.accounts[2].is_writable);

        let transfer_ix = transfer(&key(1), &key(2), &key(3), 40);
        assert_eq!(transfer_ix.data[0], 3);
        assert_eq!(transfer_ix.data.len(), 9);
        assert_eq!(transfer_ix.program_id, TOKEN_PROGRAM_ID);
    }

    #[test]
    fn test_associated_address_is_off_curve_and_stable() {
        let owner = key(0xAA);
        let mint = key(0xBB);
        let a = get_associated_token_address(&owner, &mint).unwrap();
        let b = get_associated_token_address(&owner, &mint).unwrap();
        assert_eq!(a, b);
        assert!(!is_on_curve(a.as_bytes()));
        assert_ne!(a, get_associated_token_address(&key(0xAB), &mint).unwrap());
    }

    #[test]
    fn test_create_idempotent_accounts() {
        let payer = key(1);
        let owner = key(2);
        let mint = key(3);
        let ix = create_associated_token_account_idempotent(&payer, &owner, &mint).unwrap();
        assert_eq!(ix.data, vec![1]);
        assert_eq!(ix.accounts.len(), 6);
        assert_eq!(
            ix.accounts[1].pubkey,
            get_associated_token_address(&owner, &mint).unwrap()
        );
        assert_eq!(ix.accounts[4].pubkey, SYSTEM_PROGRAM_ID);
        assert_eq!(ix.accounts[5].pubkey, TOKEN_PROGRAM_ID);
    }

    #[test]
    fn test_mint_layout() {
        let layout = MintLayout {
            mint_authority: Some(key(4)),
            supply: 1_000,
            decimals: 6,
            is_initialized: true,
            freeze_authority: None,
        };
        let data = pack_mint(&layout);
        assert_eq!(data.len(), MINT_ACCOUNT_LEN);
        assert_eq!(data[44], 6);
        assert_eq!(unpack_mint(&data).unwrap(), layout);
        assert!(unpack_mint(&data[..40]).is_err());
    }

    #[test]
    fn test_token_account_layout() {
        let data = pack_token_account(&key(1), &key(2), 60);
        assert_eq!(u64::from_le_bytes(data[64..72].try_into().unwrap()), 60);
        let layout = unpack_token_account(&data).unwrap();
        assert_eq!(layout.owner, key(2));
        assert_eq!(layout.amount, 60);
        assert!(layout.is_initialized);
    }
}
