// DANS : src/execution/signer.rs

use super::ExecutionError;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair, Signature},
    signer::Signer,
};
use std::path::Path;

/// Capacité de signature. La clé privée ne sort jamais de l'implémentation :
/// l'orchestrateur ne voit que des signatures.
pub trait TransactionSigner: Send + Sync {
    /// Le portefeuille qui paie les frais.
    fn pubkey(&self) -> Pubkey;

    /// Signe `message` pour `pubkey`, ou `None` si on ne détient pas cette clé.
    fn sign_for(&self, pubkey: &Pubkey, message: &[u8]) -> Option<Signature>;
}

/// Un ou plusieurs keypairs en mémoire ; le premier est le payeur.
pub struct KeypairSigner {
    keypairs: Vec<Keypair>,
}

impl KeypairSigner {
    pub fn new(payer: Keypair) -> Self {
        Self { keypairs: vec![payer] }
    }

    pub fn with_extra(mut self, keypair: Keypair) -> Self {
        self.keypairs.push(keypair);
        self
    }

    /// Charge un keypair au format JSON de la CLI Solana.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExecutionError> {
        let path = path.as_ref();
        read_keypair_file(path)
            .map(Self::new)
            .map_err(|e| ExecutionError::Input(format!("wallet {} illisible : {e}", path.display())))
    }
}

impl TransactionSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypairs[0].pubkey()
    }

    fn sign_for(&self, pubkey: &Pubkey, message: &[u8]) -> Option<Signature> {
        self.keypairs
            .iter()
            .find(|kp| kp.pubkey() == *pubkey)
            .map(|kp| kp.sign_message(message))
    }
}
