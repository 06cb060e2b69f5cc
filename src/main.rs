use std::io;
use std::pin::pin;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use earnings_engine::config::{DEFAULT_RATE_PER_HOUR, env_value};
use earnings_engine::domain::money::{format_live, parse_amount};
use earnings_engine::{
    Engine, EngineConfig, EngineEvent, Error, JsonFileStore, SystemClock, WithdrawalRequest,
    WithdrawalWorkflow, report,
};

const USAGE: &str = "usage: earnings_engine <store.json> <user> \
    (status | start | stop | run <seconds> | withdraw <amount> <bank> <account> <payee>)";

#[tokio::main]
async fn main() -> ExitCode {
    earnings_engine::tracing::init_stderr();

    match run(std::env::args().skip(1).collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Vec<String>) -> Result<(), Error> {
    let [store_path, user, command, rest @ ..] = args.as_slice() else {
        return Err(Error::Config(USAGE.to_string()));
    };

    let rate = env_value("EARNINGS_RATE_PER_HOUR", parse_amount).unwrap_or(DEFAULT_RATE_PER_HOUR);
    let store = Arc::new(JsonFileStore::open(store_path)?);
    let engine = Engine::initialize(
        user,
        rate,
        store,
        Arc::new(SystemClock),
        EngineConfig::from_env(),
    )?;

    let outcome = match (command.as_str(), rest) {
        ("status", []) => Ok(()),
        ("start", []) => {
            engine.set_active(true);
            Ok(())
        }
        ("stop", []) => {
            engine.set_active(false);
            Ok(())
        }
        ("run", [seconds]) => {
            let seconds = seconds
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("invalid duration {:?}: {}", seconds, e)))?;
            run_for(&engine, Duration::from_secs(seconds)).await;
            Ok(())
        }
        ("withdraw", [amount, bank, account, payee]) => {
            withdraw(&engine, amount, bank, account, payee).await
        }
        _ => Err(Error::Config(USAGE.to_string())),
    };

    engine.shutdown();
    outcome?;
    report::write_status(io::stdout().lock(), &engine)
}

async fn run_for(engine: &Engine, duration: Duration) {
    let mut events = pin!(engine.events());
    let deadline = tokio::time::sleep(duration);
    let mut deadline = pin!(deadline);

    engine.set_active(true);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.next() => match event {
                Some(EngineEvent::Tick { .. }) => {
                    if let Some(entry) = engine.logs().first() {
                        println!("{} {}", entry.time_label(), entry.message);
                    }
                }
                Some(_) => {}
                None => break,
            },
        }
    }
}

async fn withdraw(
    engine: &Engine,
    amount: &str,
    bank: &str,
    account: &str,
    payee: &str,
) -> Result<(), Error> {
    let amount = parse_amount(amount)?;
    let request = WithdrawalRequest::bank_transfer(bank, account, payee, amount);
    let bank = request.bank.clone();

    let workflow = WithdrawalWorkflow::open(engine.clone());
    let settlement = workflow.submit(request)?;
    eprintln!("Processing withdrawal of {} to {}...", format_live(amount), bank);

    let balance = settlement.wait().await?;
    eprintln!("Withdrawal accepted. Remaining balance: {}", format_live(balance));
    Ok(())
}
