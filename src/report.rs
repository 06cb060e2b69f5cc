use std::io::Write;

use rust_decimal::Decimal;

use crate::domain::Error;
use crate::engine::Engine;

const DECIMALS: u32 = 4;

/// Write the engine's status row followed by its seven-day history as CSV.
pub fn write_status<W: Write>(out: W, engine: &Engine) -> Result<(), Error> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);

    writer.write_record(["user", "balance", "activity", "rate_per_hour"])?;
    writer.write_record([
        engine.user().to_string(),
        amount(engine.current_balance()),
        engine.current_activity_state().to_string(),
        amount(engine.rate_per_hour()),
    ])?;

    writer.write_record(["date", "amount"])?;
    for day in engine.current_history().entries() {
        writer.write_record([day.date.to_string(), amount(day.amount)])?;
    }

    writer.flush()?;
    Ok(())
}

fn amount(value: Decimal) -> String {
    value.round_dp(DECIMALS).normalize().to_string()
}
