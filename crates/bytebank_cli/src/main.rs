//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `bytebank_core` linkage and configuration wiring.
//! - Run one scripted deposit/withdraw/transfer pass and print balances.

use bytebank_core::{
    init_logging, open_account_service, CoreConfig, Customer, OpenAccountRequest,
};
use rust_decimal::Decimal;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("bytebank_core ping={}", bytebank_core::ping());
    println!("bytebank_core version={}", bytebank_core::core_version());

    match run_scenario() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("bytebank_cli error={err}");
            ExitCode::FAILURE
        }
    }
}

fn run_scenario() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env()?;
    if let Some(log_dir) = config.log_dir.as_ref() {
        init_logging(&config.log_level, &log_dir.to_string_lossy())?;
    }
    let service = open_account_service(&config)?;

    for (number, name) in [(1001, "Ana"), (1002, "Bruno")] {
        let email = format!("{}@example.com", name.to_lowercase());
        let customer = Customer::new(name, format!("000.000.000-{number}"), email)?;
        service.open(&OpenAccountRequest::new(number, customer))?;
    }

    service.deposit(1001, Decimal::new(50000, 2))?;
    service.withdraw(1001, Decimal::new(20000, 2))?;
    println!("account=1001 balance={}", service.get_balance(1001)?);

    if let Err(err) = service.withdraw(1001, Decimal::new(100000, 2)) {
        println!("account=1001 withdraw_rejected=\"{err}\"");
    }

    let moved = service.transfer(1001, 1002, Decimal::new(30000, 2))?;
    println!("transfer=1001->1002 ok={moved}");
    service.close(1001)?;

    for account in service.list_open_accounts()? {
        println!("account={} balance={}", account.number, account.balance);
    }
    Ok(())
}
