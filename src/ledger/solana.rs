//! Solana JSON-RPC implementation of the ledger gateway

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use borsh::BorshSerialize;
use solana_rpc_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::accounts::discriminator;
use super::{
    ConfigAccount, ContributorAccount, EpochAccount, LedgerAccount, LedgerError, LedgerGateway,
    ProgramAddresses, Pubkey, SnapshotAccount, TxSignature,
};
use crate::config::LedgerConfig;
use crate::models::{ContributorRecord, XpCategory};

#[derive(BorshSerialize)]
struct SyncContributorXpArgs<'a> {
    wallet: Pubkey,
    github_username: &'a str,
    total_xp: u64,
    role_xp_data: &'a [XpCategory],
    domain_xp_data: &'a [XpCategory],
    skill_xp_data: &'a [XpCategory],
}

/// RPC client for the configured endpoint, timeout and commitment level
pub fn rpc_client(config: &LedgerConfig) -> Result<RpcClient, LedgerError> {
    let commitment = CommitmentConfig::from_str(&config.commitment)
        .map_err(|_| LedgerError::Commitment(config.commitment.clone()))?;
    Ok(RpcClient::new_with_timeout_and_commitment(
        config.rpc_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
        commitment,
    ))
}

/// Anchor instruction: `global:` discriminator followed by borsh args
fn program_instruction<T: BorshSerialize>(
    program_id: Pubkey,
    name: &str,
    args: &T,
    accounts: Vec<AccountMeta>,
) -> Result<Instruction, LedgerError> {
    let mut data = discriminator("global", name).to_vec();
    args.serialize(&mut data)
        .map_err(|e| LedgerError::Encode(e.to_string()))?;
    Ok(Instruction::new_with_bytes(program_id, &data, accounts))
}

/// Gateway to the rewards program on a Solana cluster
pub struct SolanaGateway {
    rpc: RpcClient,
    addresses: ProgramAddresses,
    signer: Option<Keypair>,
    confirm_timeout: Duration,
    confirm_poll: Duration,
}

impl SolanaGateway {
    pub fn new(
        config: &LedgerConfig,
        program_id: Pubkey,
        signer: Option<Keypair>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            rpc: rpc_client(config)?,
            addresses: ProgramAddresses::new(program_id),
            signer,
            confirm_timeout: Duration::from_secs(config.confirm_timeout_secs),
            confirm_poll: Duration::from_millis(config.confirm_poll_ms),
        })
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn addresses(&self) -> &ProgramAddresses {
        &self.addresses
    }

    /// Public key of the oracle signer, if one is configured
    pub fn oracle(&self) -> Option<Pubkey> {
        self.signer.as_ref().map(|key| key.pubkey())
    }

    async fn fetch<A: LedgerAccount>(&self, address: &Pubkey) -> Result<Option<A>, LedgerError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.rpc.commitment())
            .await?;
        match response.value {
            Some(account) => A::decode(&account.data).map(Some),
            None => Ok(None),
        }
    }

    async fn require_config(&self) -> Result<ConfigAccount, LedgerError> {
        self.get_config().await?.ok_or(LedgerError::ConfigNotFound)
    }

    fn config_address(&self) -> Result<Pubkey, LedgerError> {
        self.addresses
            .config()
            .ok_or(LedgerError::AddressDerivation("config"))
    }

    fn epoch_address(&self, epoch_number: u64) -> Result<Pubkey, LedgerError> {
        self.addresses
            .epoch(epoch_number)
            .ok_or(LedgerError::AddressDerivation("epoch"))
    }

    /// Sign with the oracle as sole signer and fee payer, submit, and wait
    /// for the configured commitment
    async fn submit(&self, instruction: Instruction) -> Result<TxSignature, LedgerError> {
        let signer = self.signer.as_ref().ok_or(LedgerError::MissingSigner)?;

        let blockhash = self.rpc.get_latest_blockhash().await?;
        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&signer.pubkey()),
            &[signer],
            blockhash,
        );

        let signature = self.rpc.send_transaction(&transaction).await?;
        debug!(%signature, "Transaction submitted");

        self.await_confirmation(&signature).await?;
        Ok(TxSignature(signature.to_string()))
    }

    async fn await_confirmation(&self, signature: &Signature) -> Result<(), LedgerError> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            match self
                .rpc
                .get_signature_status_with_commitment(signature, self.rpc.commitment())
                .await
            {
                Ok(Some(Ok(()))) => return Ok(()),
                Ok(Some(Err(err))) => {
                    return Err(LedgerError::TransactionFailed {
                        signature: signature.to_string(),
                        reason: err.to_string(),
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(%signature, error = %e, "Status poll failed"),
            }

            if Instant::now() >= deadline {
                return Err(LedgerError::ConfirmationTimeout(signature.to_string()));
            }
            tokio::time::sleep(self.confirm_poll).await;
        }
    }
}

#[async_trait]
impl LedgerGateway for SolanaGateway {
    async fn get_config(&self) -> Result<Option<ConfigAccount>, LedgerError> {
        self.fetch(&self.config_address()?).await
    }

    async fn get_epoch(&self, epoch_number: u64) -> Result<Option<EpochAccount>, LedgerError> {
        self.fetch(&self.epoch_address(epoch_number)?).await
    }

    async fn get_contributor(
        &self,
        wallet: &Pubkey,
    ) -> Result<Option<ContributorAccount>, LedgerError> {
        let address = self
            .addresses
            .contributor(wallet)
            .ok_or(LedgerError::AddressDerivation("contributor"))?;
        self.fetch(&address).await
    }

    async fn get_snapshot(
        &self,
        epoch_number: u64,
        wallet: &Pubkey,
    ) -> Result<Option<SnapshotAccount>, LedgerError> {
        let address = self
            .addresses
            .snapshot(epoch_number, wallet)
            .ok_or(LedgerError::AddressDerivation("snapshot"))?;
        self.fetch(&address).await
    }

    async fn submit_sync(&self, record: &ContributorRecord) -> Result<TxSignature, LedgerError> {
        let oracle = self.oracle().ok_or(LedgerError::MissingSigner)?;
        let config = self.require_config().await?;
        let epoch = config.current_epoch;

        let contributor = self
            .addresses
            .contributor(&record.wallet)
            .ok_or(LedgerError::AddressDerivation("contributor"))?;
        let snapshot = self
            .addresses
            .snapshot(epoch, &record.wallet)
            .ok_or(LedgerError::AddressDerivation("snapshot"))?;

        let args = SyncContributorXpArgs {
            wallet: record.wallet,
            github_username: &record.username,
            total_xp: record.total_xp,
            role_xp_data: &record.categories.role,
            domain_xp_data: &record.categories.domain,
            skill_xp_data: &record.categories.skill,
        };
        let instruction = program_instruction(
            self.addresses.program_id(),
            "sync_contributor_xp",
            &args,
            vec![
                AccountMeta::new_readonly(self.config_address()?, false),
                AccountMeta::new(self.epoch_address(epoch)?, false),
                AccountMeta::new(contributor, false),
                AccountMeta::new(snapshot, false),
                AccountMeta::new(oracle, true),
                AccountMeta::new_readonly(system_program::ID, false),
            ],
        )?;

        self.submit(instruction).await
    }

    async fn submit_create_epoch(&self, reward_amount: u64) -> Result<TxSignature, LedgerError> {
        let oracle = self.oracle().ok_or(LedgerError::MissingSigner)?;
        let config = self.require_config().await?;
        let next_epoch = config.current_epoch + 1;

        let instruction = program_instruction(
            self.addresses.program_id(),
            "create_epoch",
            &reward_amount,
            vec![
                AccountMeta::new(self.config_address()?, false),
                AccountMeta::new(self.epoch_address(next_epoch)?, false),
                AccountMeta::new(oracle, true),
                AccountMeta::new_readonly(system_program::ID, false),
            ],
        )?;

        let signature = self.submit(instruction).await?;
        info!(epoch = next_epoch, %signature, "Epoch creation confirmed");
        Ok(signature)
    }

    async fn submit_finalize_epoch(
        &self,
        epoch_number: u64,
    ) -> Result<TxSignature, LedgerError> {
        let oracle = self.oracle().ok_or(LedgerError::MissingSigner)?;

        let instruction = program_instruction(
            self.addresses.program_id(),
            "finalize_epoch",
            &epoch_number,
            vec![
                AccountMeta::new_readonly(self.config_address()?, false),
                AccountMeta::new(self.epoch_address(epoch_number)?, false),
                AccountMeta::new_readonly(oracle, true),
            ],
        )?;

        self.submit(instruction).await
    }
}
