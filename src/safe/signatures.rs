use std::collections::BTreeMap;

use ethers::types::{Address, Bytes, Signature, H256, U256};

/// Owner approvals collected for one Safe transaction.
///
/// The Safe walks signatures expecting strictly increasing owner addresses,
/// so entries are kept keyed by owner and emitted in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafeSignatures {
    entries: BTreeMap<Address, SignatureEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignatureEntry {
    /// ECDSA signature over the Safe transaction hash
    Ecdsa(Signature),
    /// `v = 1`: the owner is the transaction sender or approved the hash
    /// on-chain
    Approved,
}

impl SafeSignatures {
    /// An empty set of approvals
    pub fn new() -> Self {
        Default::default()
    }

    /// Add an owner's typed-data signature. A later signature by the same
    /// owner replaces the earlier one.
    pub fn add(&mut self, owner: Address, signature: Signature) -> &mut Self {
        self.entries.insert(owner, SignatureEntry::Ecdsa(signature));
        self
    }

    /// Add a pre-validated approval for an owner that submits the
    /// `execTransaction` itself or called `approveHash` beforehand
    pub fn add_approved(&mut self, owner: Address) -> &mut Self {
        self.entries.insert(owner, SignatureEntry::Approved);
        self
    }

    /// Number of distinct owners that approved
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no owner approved yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owners that approved, ascending
    pub fn signers(&self) -> impl Iterator<Item = &Address> {
        self.entries.keys()
    }

    /// Concatenated `r || s || v` words, ordered by owner address
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(self.entries.len() * 65);
        for (owner, entry) in &self.entries {
            match entry {
                SignatureEntry::Ecdsa(sig) => out.extend_from_slice(&sig.to_vec()),
                SignatureEntry::Approved => {
                    out.extend_from_slice(H256::from(*owner).as_bytes());
                    out.extend_from_slice(&[0u8; 32]);
                    out.push(1);
                }
            }
        }
        out.into()
    }
}

impl FromIterator<(Address, Signature)> for SafeSignatures {
    fn from_iter<T: IntoIterator<Item = (Address, Signature)>>(iter: T) -> Self {
        let mut sigs = Self::new();
        for (owner, sig) in iter {
            sigs.add(owner, sig);
        }
        sigs
    }
}

/// Split a combined signature blob back into `(r, s, v)` triples
pub fn split_signatures(blob: &[u8]) -> Vec<(U256, U256, u8)> {
    blob.chunks_exact(65)
        .map(|chunk| {
            (
                U256::from_big_endian(&chunk[..32]),
                U256::from_big_endian(&chunk[32..64]),
                chunk[64],
            )
        })
        .collect()
}
