use bytebank_core::{
    AccountService, BusinessRuleError, ConnectionPool, Customer, OpenAccountRequest,
    ServiceError, SqliteAccountRepository,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn service() -> AccountService<SqliteAccountRepository> {
    let pool = ConnectionPool::in_memory().unwrap();
    AccountService::new(SqliteAccountRepository::new(pool))
}

fn open(service: &AccountService<SqliteAccountRepository>, number: i64) {
    let customer = Customer::new("João Souza", "987.654.321-00", "joao@example.com").unwrap();
    service
        .open(&OpenAccountRequest::new(number, customer))
        .unwrap();
}

fn rule(err: ServiceError) -> BusinessRuleError {
    match err {
        ServiceError::BusinessRule(rule) => rule,
        other => panic!("expected business rule error, got: {other}"),
    }
}

#[test]
fn deposit_and_withdraw_scenario() {
    let service = service();
    open(&service, 1001);
    assert_eq!(service.get_balance(1001).unwrap(), Decimal::ZERO);

    service.deposit(1001, dec!(500.00)).unwrap();
    assert_eq!(service.get_balance(1001).unwrap(), dec!(500.00));

    service.withdraw(1001, dec!(200.00)).unwrap();
    assert_eq!(service.get_balance(1001).unwrap(), dec!(300.00));

    let err = service.withdraw(1001, dec!(1000.00)).unwrap_err();
    assert_eq!(rule(err), BusinessRuleError::InsufficientBalance);
    assert_eq!(service.get_balance(1001).unwrap(), dec!(300.00));
}

#[test]
fn non_positive_amounts_are_rejected_without_side_effects() {
    let service = service();
    open(&service, 1001);
    service.deposit(1001, dec!(10)).unwrap();

    for amount in [Decimal::ZERO, dec!(-5.00)] {
        let err = service.withdraw(1001, amount).unwrap_err();
        assert_eq!(rule(err), BusinessRuleError::InvalidAmount);
        let err = service.deposit(1001, amount).unwrap_err();
        assert_eq!(rule(err), BusinessRuleError::InvalidAmount);
    }
    assert_eq!(service.get_balance(1001).unwrap(), dec!(10));
}

#[test]
fn withdrawing_entire_balance_is_allowed() {
    let service = service();
    open(&service, 1001);
    service.deposit(1001, dec!(75.25)).unwrap();

    service.withdraw(1001, dec!(75.25)).unwrap();
    assert_eq!(service.get_balance(1001).unwrap(), Decimal::ZERO);
}

#[test]
fn deposit_then_withdraw_restores_balance_exactly() {
    let service = service();
    open(&service, 1001);
    service.deposit(1001, dec!(0.30)).unwrap();

    for _ in 0..10 {
        service.deposit(1001, dec!(0.1)).unwrap();
        service.withdraw(1001, dec!(0.1)).unwrap();
    }
    assert_eq!(service.get_balance(1001).unwrap(), dec!(0.30));
}

#[test]
fn unknown_account_is_a_business_error() {
    let service = service();

    assert_eq!(
        rule(service.get_by_number(404).unwrap_err()),
        BusinessRuleError::AccountNotFound(404)
    );
    assert_eq!(
        rule(service.deposit(404, dec!(1)).unwrap_err()),
        BusinessRuleError::AccountNotFound(404)
    );
    assert_eq!(
        rule(service.close(404).unwrap_err()),
        BusinessRuleError::AccountNotFound(404)
    );
}

#[test]
fn duplicate_open_is_a_store_error() {
    let service = service();
    open(&service, 1001);

    let customer = Customer::new("Outra", "1", "outra@example.com").unwrap();
    let err = service
        .open(&OpenAccountRequest::new(1001, customer))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Store(_)));
    assert!(err.business_rule().is_none());
}

#[test]
fn close_requires_zero_balance() {
    let service = service();
    open(&service, 1001);
    service.deposit(1001, dec!(1.00)).unwrap();

    let err = service.close(1001).unwrap_err();
    assert_eq!(rule(err), BusinessRuleError::AccountStillFunded);
    assert_eq!(service.list_open_accounts().unwrap().len(), 1);

    service.withdraw(1001, dec!(1.00)).unwrap();
    service.close(1001).unwrap();
    assert!(service.list_open_accounts().unwrap().is_empty());
}

#[test]
fn closed_account_cannot_be_mutated() {
    let service = service();
    open(&service, 1001);
    service.close(1001).unwrap();

    assert_eq!(
        rule(service.deposit(1001, dec!(5)).unwrap_err()),
        BusinessRuleError::AccountNotFound(1001)
    );
    assert_eq!(
        rule(service.close(1001).unwrap_err()),
        BusinessRuleError::AccountNotFound(1001)
    );
}

#[test]
fn transfer_moves_full_balance_and_allows_close() {
    let service = service();
    open(&service, 1001);
    open(&service, 1002);
    service.deposit(1001, dec!(300.00)).unwrap();
    service.deposit(1002, dec!(20.00)).unwrap();

    assert!(service.transfer(1001, 1002, dec!(300.00)).unwrap());
    assert_eq!(service.get_balance(1001).unwrap(), dec!(0.00));
    assert_eq!(service.get_balance(1002).unwrap(), dec!(320.00));

    service.close(1001).unwrap();
    let open_numbers: Vec<i64> = service
        .list_open_accounts()
        .unwrap()
        .into_iter()
        .map(|account| account.number)
        .collect();
    assert_eq!(open_numbers, vec![1002]);
}

#[test]
fn transfer_exceeding_balance_returns_false_and_changes_nothing() {
    let service = service();
    open(&service, 1001);
    open(&service, 1002);
    service.deposit(1001, dec!(100)).unwrap();
    service.deposit(1002, dec!(7)).unwrap();

    assert!(!service.transfer(1001, 1002, dec!(100.01)).unwrap());
    assert_eq!(service.get_balance(1001).unwrap(), dec!(100));
    assert_eq!(service.get_balance(1002).unwrap(), dec!(7));
}

#[test]
fn transfer_to_missing_destination_does_not_debit_source() {
    let service = service();
    open(&service, 1001);
    service.deposit(1001, dec!(50)).unwrap();

    assert!(!service.transfer(1001, 9999, dec!(20)).unwrap());
    assert_eq!(service.get_balance(1001).unwrap(), dec!(50));
}

#[test]
fn transfer_rejects_invalid_amount_and_same_account() {
    let service = service();
    open(&service, 1001);
    open(&service, 1002);
    service.deposit(1001, dec!(50)).unwrap();

    assert!(!service.transfer(1001, 1002, Decimal::ZERO).unwrap());
    assert!(!service.transfer(1001, 1001, dec!(10)).unwrap());
    assert_eq!(service.get_balance(1001).unwrap(), dec!(50));
    assert_eq!(service.get_balance(1002).unwrap(), Decimal::ZERO);
}

#[test]
fn balances_stay_non_negative_across_mixed_operations() {
    let service = service();
    open(&service, 1);
    open(&service, 2);

    let steps: [(&str, Decimal); 8] = [
        ("deposit", dec!(10)),
        ("withdraw", dec!(15)),
        ("transfer", dec!(4)),
        ("withdraw", dec!(6)),
        ("withdraw", dec!(0.01)),
        ("transfer", dec!(1)),
        ("deposit", dec!(2.5)),
        ("transfer", dec!(2.5)),
    ];
    for (kind, amount) in steps {
        let _ = match kind {
            "deposit" => service.deposit(1, amount).map(|_| true),
            "withdraw" => service.withdraw(1, amount).map(|_| true),
            _ => service.transfer(1, 2, amount),
        };
        for account in service.list_open_accounts().unwrap() {
            assert!(account.balance >= Decimal::ZERO);
        }
    }
    assert_eq!(service.get_balance(1).unwrap(), Decimal::ZERO);
    assert_eq!(service.get_balance(2).unwrap(), dec!(6.5));
}
