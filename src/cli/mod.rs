//! Command-line interface definitions and handlers.

use std::time::Duration;

use alloy::primitives::{Address, B256, U256};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use crate::{
    client::NodeClient,
    config::Config,
    error::{AppError, Result},
    tx::{self, SignedTransaction, TransactionFields, TxType, UnsignedTransaction, Wallet},
    types::{
        from_wei_str, parse_address, parse_hash, parse_hex_bytes, parse_u64_quantity, to_quantity,
        to_wei, CallRequest, Unit,
    },
};

/// Ethereum node client: queries, transfers and subscriptions.
#[derive(Parser, Debug)]
#[command(name = "mm-eth")]
#[command(version)]
#[command(about = "Ethereum JSON-RPC client tools", long_about = None)]
pub struct Cli {
    /// Node URL; repeat for failover, highest priority first (overrides MM_ETH_NODES)
    #[arg(global = true, long = "node")]
    pub nodes: Vec<String>,

    /// Websocket URL for subscriptions (overrides MM_ETH_WS_URL)
    #[arg(global = true, long = "ws")]
    pub ws_url: Option<String>,

    /// Expected chain id, decimal or 0x quantity (overrides MM_ETH_CHAIN_ID)
    #[arg(global = true, long, value_parser = parse_u64_arg)]
    pub chain_id: Option<u64>,

    /// Per-attempt request timeout in milliseconds
    #[arg(global = true, long)]
    pub timeout_ms: Option<u64>,

    /// Retries after a failed attempt
    #[arg(global = true, long)]
    pub retries: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the node's chain id
    ChainId,

    /// Print the latest block number
    BlockNumber,

    /// Print the balance of an address
    Balance {
        #[arg(value_parser = parse_address)]
        address: Address,
        /// Display unit (wei, gwei, eth)
        #[arg(long, default_value = "eth")]
        unit: Unit,
        /// Fractional digits to keep
        #[arg(long, default_value_t = 5)]
        round: u32,
    },

    /// Print the transaction count (nonce) of an address
    Nonce {
        #[arg(value_parser = parse_address)]
        address: Address,
    },

    /// Print a transaction receipt
    Receipt {
        #[arg(value_parser = parse_hash)]
        hash: B256,
        /// Wait until the receipt is available
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },

    /// Transfer ether
    SendEth(SendEthArgs),

    /// Decode a raw signed transaction
    DecodeTx {
        /// Hex-encoded raw transaction
        raw: String,
    },

    /// Print the address of a private key
    Address {
        private_key: String,
    },

    /// Stream new block headers
    WatchHeads {
        /// Stop after this many headers
        #[arg(long)]
        count: Option<usize>,
    },
}

#[derive(Args, Debug)]
pub struct SendEthArgs {
    /// Sender private key
    #[arg(long, env = "MM_ETH_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: String,

    /// Recipient address; repeat to send one transfer per recipient, in order
    #[arg(long = "to", required = true, value_parser = parse_address)]
    pub to: Vec<Address>,

    /// Amount in `--unit`, or `all` for the balance left after the fee cap
    #[arg(long)]
    pub value: String,

    #[arg(long, default_value = "eth")]
    pub unit: Unit,

    /// Skip a transfer whose amount is below this, in `--unit`
    #[arg(long)]
    pub value_min: Option<String>,

    /// Gas limit (default: eth_estimateGas)
    #[arg(long)]
    pub gas: Option<u64>,

    /// Max fee per gas in gwei (default: 2 * base fee + priority fee)
    #[arg(long, conflicts_with = "legacy")]
    pub max_fee_gwei: Option<String>,

    /// Priority fee per gas in gwei (default: node suggestion)
    #[arg(long, conflicts_with = "legacy")]
    pub priority_fee_gwei: Option<String>,

    /// Skip a transfer whose fee cap (max fee or gas price) exceeds this, in gwei
    #[arg(long)]
    pub max_fee_limit_gwei: Option<String>,

    /// Send a legacy (type 0) transaction
    #[arg(long)]
    pub legacy: bool,

    /// Gas price in gwei for legacy transactions (default: node gas price)
    #[arg(long, requires = "legacy")]
    pub gas_price_gwei: Option<String>,

    /// Nonce of the first transfer, decimal or 0x quantity (default: account transaction count)
    #[arg(long, value_parser = parse_u64_arg)]
    pub nonce: Option<u64>,

    /// Seconds to wait between transfers
    #[arg(long)]
    pub delay_secs: Option<f64>,

    /// Resolve fees, gas and value and log them without signing or sending
    #[arg(long)]
    pub emulate: bool,

    /// Return right after broadcasting
    #[arg(long)]
    pub no_receipt: bool,

    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,
}

/// Amount requested for each transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Amount {
    Exact(U256),
    /// Whole balance minus the worst-case fee.
    All,
}

impl Amount {
    fn parse(value: &str, unit: Unit) -> Result<Self> {
        match value.trim() {
            "all" | "balance" => Ok(Amount::All),
            other => Ok(Amount::Exact(to_wei(other, unit)?)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fees {
    Legacy { gas_price: u128 },
    Dynamic { max_fee: u128, priority_fee: u128 },
}

impl Fees {
    /// Highest price per gas the transaction may pay.
    fn cap(&self) -> u128 {
        match *self {
            Fees::Legacy { gas_price } => gas_price,
            Fees::Dynamic { max_fee, .. } => max_fee,
        }
    }

    fn fields(&self) -> TransactionFields {
        match *self {
            Fees::Legacy { gas_price } => TransactionFields::new(TxType::Legacy).gas_price(gas_price),
            Fees::Dynamic { max_fee, priority_fee } => TransactionFields::new(TxType::DynamicFee)
                .max_fee_per_gas(max_fee)
                .max_priority_fee_per_gas(priority_fee),
        }
    }
}

/// What happened to one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Sent(B256),
    Emulated,
    Skipped(String),
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> Result<Config> {
        let mut config = Config::from_lookup(|key| std::env::var(key).ok())?;
        if !self.nodes.is_empty() {
            config.nodes = self.nodes.clone();
        }
        if self.ws_url.is_some() {
            config.ws_url = self.ws_url.clone();
        }
        if self.chain_id.is_some() {
            config.chain_id = self.chain_id;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        Ok(config)
    }
}

/// Execute `cli`, printing results to stdout.
pub async fn run(cli: Cli, config: Config) -> Result<()> {
    // Offline commands.
    match &cli.command {
        Commands::DecodeTx { raw } => return print_json(&decode_tx(raw)?),
        Commands::Address { private_key } => {
            let wallet = Wallet::from_private_key(private_key)?;
            println!("{}", wallet.address().to_checksum(None));
            return Ok(());
        }
        _ => {}
    }

    if config.nodes.is_empty() {
        return Err(AppError::Config("No node configured; pass --node or set MM_ETH_NODES".into()));
    }
    let client = NodeClient::from_config(&config).await?;
    if let Some(expected) = config.chain_id {
        client.check_chain_id(expected).await?;
    }

    match cli.command {
        Commands::ChainId => println!("{}", client.chain_id().await?),
        Commands::BlockNumber => println!("{}", client.block_number().await?),
        Commands::Balance { address, unit, round } => {
            let balance = client.get_balance(address).await?;
            println!("{}", from_wei_str(balance, unit, round));
        }
        Commands::Nonce { address } => println!("{}", client.get_transaction_count(address).await?),
        Commands::Receipt { hash, wait, timeout_secs } => {
            let receipt = if wait {
                Some(
                    client
                        .wait_for_receipt(hash, Duration::from_secs(1), Duration::from_secs(timeout_secs))
                        .await?,
                )
            } else {
                client.get_transaction_receipt(hash).await?
            };
            print_json(&receipt)?;
        }
        Commands::SendEth(args) => {
            send_eth(&client, args).await?;
        }
        Commands::WatchHeads { count } => {
            let mut heads = client.subscribe_new_heads().await?;
            let mut seen = 0;
            while let Some(header) = heads.next_header().await {
                let header = header?;
                println!("{} {}", header.number.to::<u64>(), header.hash);
                seen += 1;
                if count.is_some_and(|count| seen >= count) {
                    break;
                }
            }
        }
        Commands::DecodeTx { .. } | Commands::Address { .. } => {}
    }

    Ok(())
}

/// Run one transfer per `--to` recipient, in order, from the same sender.
pub async fn send_eth(client: &NodeClient, args: SendEthArgs) -> Result<Vec<TransferOutcome>> {
    let wallet = Wallet::from_private_key(&args.private_key)?;
    let amount = Amount::parse(&args.value, args.unit)?;
    let value_min = args.value_min.as_deref().map(|min| to_wei(min, args.unit)).transpose()?;
    let max_fee_limit = args.max_fee_limit_gwei.as_deref().map(gwei_to_wei).transpose()?;
    let chain_id = client.chain_id().await?;

    let mut nonce = match args.nonce {
        Some(nonce) => nonce,
        None => client.get_transaction_count(wallet.address()).await?,
    };

    let delay = args
        .delay_secs
        .map(Duration::try_from_secs_f64)
        .transpose()
        .map_err(|e| AppError::Config(format!("Invalid --delay-secs: {e}")))?;

    let transfer = Transfer { client, args: &args, wallet: &wallet, chain_id, amount };
    let mut outcomes = Vec::with_capacity(args.to.len());
    for (index, &to) in args.to.iter().enumerate() {
        if index > 0 && !args.emulate {
            if let Some(delay) = delay.filter(|delay| !delay.is_zero()) {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "Waiting before next transfer");
                tokio::time::sleep(delay).await;
            }
        }

        let outcome = transfer.run(to, nonce, max_fee_limit, value_min).await?;
        match &outcome {
            TransferOutcome::Sent(_) => nonce += 1,
            TransferOutcome::Emulated => {}
            TransferOutcome::Skipped(reason) => println!("skipped {}: {reason}", to.to_checksum(None)),
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

struct Transfer<'a> {
    client: &'a NodeClient,
    args: &'a SendEthArgs,
    wallet: &'a Wallet,
    chain_id: u64,
    amount: Amount,
}

impl Transfer<'_> {
    async fn run(
        &self,
        to: Address,
        nonce: u64,
        max_fee_limit: Option<u128>,
        value_min: Option<U256>,
    ) -> Result<TransferOutcome> {
        let from = self.wallet.address();
        let fees = self.fees().await?;
        if let Some(reason) = fee_limit_exceeded(fees.cap(), max_fee_limit) {
            tracing::warn!(from = %from, to = %to, reason = %reason, "Skipping transfer");
            return Ok(TransferOutcome::Skipped(reason));
        }

        let gas = match self.args.gas {
            Some(gas) => gas,
            None => {
                let estimate_value = match self.amount {
                    Amount::Exact(value) => value,
                    Amount::All => U256::ZERO,
                };
                self.client.estimate_gas(&CallRequest::transfer(from, to, estimate_value)).await?
            }
        };

        let value = match self.amount {
            Amount::Exact(value) => value,
            Amount::All => {
                let balance = self.client.get_balance(from).await?;
                balance.saturating_sub(fee_budget(fees.cap(), gas))
            }
        };
        if let Some(reason) = value_below_min(value, value_min) {
            tracing::warn!(from = %from, to = %to, reason = %reason, "Skipping transfer");
            return Ok(TransferOutcome::Skipped(reason));
        }

        if self.args.emulate {
            let priority_fee = match fees {
                Fees::Dynamic { priority_fee, .. } => priority_fee,
                Fees::Legacy { .. } => 0,
            };
            tracing::info!(
                from = %from,
                to = %to,
                nonce,
                value = %from_wei_str(value, Unit::Ether, 5),
                max_fee = %from_wei_str(U256::from(fees.cap()), Unit::Gwei, 5),
                priority_fee = %from_wei_str(U256::from(priority_fee), Unit::Gwei, 5),
                gas,
                "Emulated transfer"
            );
            return Ok(TransferOutcome::Emulated);
        }

        let tx = fees
            .fields()
            .chain_id(self.chain_id)
            .nonce(nonce)
            .to(to)
            .value(value)
            .gas_limit(gas)
            .build()?;

        let balance = self.client.get_balance(from).await?;
        let required = max_cost(&tx);
        if balance < required {
            tracing::warn!(
                balance = %from_wei_str(balance, Unit::Ether, 6),
                required = %from_wei_str(required, Unit::Ether, 6),
                "Balance may not cover value plus fees"
            );
        }

        tracing::debug!(request = ?tx.to_call_request(from), "Sending transfer");
        let hash = self.client.sign_and_send(tx, self.wallet).await?;
        println!("{hash}");

        if !self.args.no_receipt {
            let receipt = self
                .client
                .wait_for_receipt(hash, Duration::from_secs(1), Duration::from_secs(self.args.timeout_secs))
                .await?;
            let status = match receipt.succeeded() {
                Some(true) => "success",
                Some(false) => "reverted",
                None => "unknown",
            };
            tracing::info!(tx_hash = %hash, value = %from_wei_str(value, Unit::Ether, 5), status, "Transfer mined");
            println!("status: {status}");
        }
        Ok(TransferOutcome::Sent(hash))
    }

    async fn fees(&self) -> Result<Fees> {
        let args = self.args;
        if args.legacy {
            let gas_price = match &args.gas_price_gwei {
                Some(gwei) => gwei_to_wei(gwei)?,
                None => self.client.gas_price().await?,
            };
            return Ok(Fees::Legacy { gas_price });
        }

        let priority_fee = match &args.priority_fee_gwei {
            Some(gwei) => gwei_to_wei(gwei)?,
            None => self.client.max_priority_fee().await?,
        };
        let max_fee = match &args.max_fee_gwei {
            Some(gwei) => gwei_to_wei(gwei)?,
            None => self.client.base_fee().await?.saturating_mul(2).saturating_add(priority_fee),
        };
        Ok(Fees::Dynamic { max_fee, priority_fee })
    }
}

fn fee_budget(fee_cap: u128, gas: u64) -> U256 {
    U256::from(fee_cap).saturating_mul(U256::from(gas))
}

fn fee_limit_exceeded(fee_cap: u128, limit: Option<u128>) -> Option<String> {
    let limit = limit?;
    (fee_cap > limit).then(|| {
        format!(
            "fee cap {} gwei exceeds limit {} gwei",
            from_wei_str(U256::from(fee_cap), Unit::Gwei, 5),
            from_wei_str(U256::from(limit), Unit::Gwei, 5)
        )
    })
}

fn value_below_min(value: U256, min: Option<U256>) -> Option<String> {
    if value.is_zero() {
        return Some("nothing to send".to_string());
    }
    let min = min?;
    (value < min).then(|| {
        format!(
            "value {} eth is below minimum {} eth",
            from_wei_str(value, Unit::Ether, 6),
            from_wei_str(min, Unit::Ether, 6)
        )
    })
}

/// Upper bound of what `tx` can cost: value plus gas limit times the fee cap.
fn max_cost(tx: &UnsignedTransaction) -> U256 {
    let fee_cap = match tx {
        UnsignedTransaction::Legacy(inner) => inner.gas_price,
        UnsignedTransaction::AccessList(inner) => inner.gas_price,
        UnsignedTransaction::DynamicFee(inner) => inner.max_fee_per_gas,
    };
    tx.value()
        .saturating_add(U256::from(fee_cap).saturating_mul(U256::from(tx.gas_limit())))
}

/// Decimal or `0x`-prefixed quantity.
fn parse_u64_arg(s: &str) -> Result<u64> {
    let trimmed = s.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        parse_u64_quantity(trimmed)
    } else {
        Ok(trimmed.parse()?)
    }
}

fn gwei_to_wei(gwei: &str) -> Result<u128> {
    let wei = to_wei(gwei, Unit::Gwei)?;
    u128::try_from(wei).map_err(|_| AppError::Parse(format!("Fee too large: {gwei} gwei")))
}

/// JSON summary of a raw signed transaction.
pub fn decode_tx(raw: &str) -> Result<Value> {
    let bytes = parse_hex_bytes(raw)?;
    let signed = tx::decode_raw(&bytes)?;
    Ok(describe(&signed))
}

fn describe(signed: &SignedTransaction) -> Value {
    let tx = signed.transaction();
    let mut out = json!({
        "hash": signed.hash(),
        "type": signed.tx_type(),
        "chain_id": signed.chain_id().map(to_quantity),
        "nonce": to_quantity(tx.nonce()),
        "from": signed.recover_sender().ok().map(|a| a.to_checksum(None)),
        "to": tx.to().map(|a| a.to_checksum(None)),
        "value": to_quantity(tx.value()),
        "gas_limit": to_quantity(tx.gas_limit()),
        "data": tx.input(),
        "v": to_quantity(signed.v()),
        "r": to_quantity(signed.signature().r()),
        "s": to_quantity(signed.signature().s()),
    });
    match tx {
        UnsignedTransaction::Legacy(inner) => {
            out["gas_price"] = json!(to_quantity(inner.gas_price));
        }
        UnsignedTransaction::AccessList(inner) => {
            out["gas_price"] = json!(to_quantity(inner.gas_price));
            out["access_list"] = json!(inner.access_list);
        }
        UnsignedTransaction::DynamicFee(inner) => {
            out["max_fee_per_gas"] = json!(to_quantity(inner.max_fee_per_gas));
            out["max_priority_fee_per_gas"] = json!(to_quantity(inner.max_priority_fee_per_gas));
            out["access_list"] = json!(inner.access_list);
        }
    }
    out
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
