//! Seed data for the `memory` backend.

use api_types::{
    catalog::{Account, Category},
    ledger::{Item, Transaction},
};
use chrono::{Days, NaiveDate};
use engine::Snapshot;
use uuid::Uuid;

fn category(name: &str, order_position: i64) -> Category {
    Category {
        id: Uuid::new_v4(),
        name: name.to_string(),
        order_position,
    }
}

fn account(name: &str, order_position: i64, starting_amount: &str) -> Account {
    Account {
        id: Uuid::new_v4(),
        name: name.to_string(),
        order_position,
        starting_amount: starting_amount.to_string(),
    }
}

/// `items` are `(name, amount, category, account)`.
fn transaction(
    date: NaiveDate,
    name: &str,
    order_position: i64,
    items: &[(&str, &str, Option<Uuid>, Option<Uuid>)],
) -> Transaction {
    let id = Uuid::new_v4();
    Transaction {
        id,
        date,
        name: name.to_string(),
        order_position,
        items: items
            .iter()
            .enumerate()
            .map(|(position, (name, amount, category_id, account_id))| Item {
                id: Uuid::new_v4(),
                transaction_id: id,
                name: name.to_string(),
                amount: amount.to_string(),
                category_id: *category_id,
                account_id: *account_id,
                order_position: position as i64,
            })
            .collect(),
    }
}

/// A small ledger spread over `today` and the day before.
pub fn snapshot(today: NaiveDate) -> Snapshot {
    let yesterday = today.checked_sub_days(Days::new(1)).unwrap_or(today);
    let food = category("Food", 0);
    let transport = category("Transport", 1);
    let home = category("Home", 2);
    let cash = account("Cash", 0, "50.00");
    let bank = account("Bank", 1, "1500.00");

    let transactions = vec![
        transaction(
            today,
            "Supermarket",
            1,
            &[
                ("Bread", "-2.40", Some(food.id), Some(cash.id)),
                ("Milk", "-1.15", Some(food.id), Some(cash.id)),
                ("Detergent", "-6.90", Some(home.id), Some(cash.id)),
            ],
        ),
        transaction(
            today,
            "Bus ticket",
            0,
            &[("Ticket", "-1.90", Some(transport.id), Some(bank.id))],
        ),
        transaction(
            yesterday,
            "Rent",
            1,
            &[("May", "-650.00", Some(home.id), Some(bank.id))],
        ),
        transaction(
            yesterday,
            "Salary",
            0,
            &[("Acme Corp", "2100.00", None, Some(bank.id))],
        ),
    ];

    Snapshot {
        transactions,
        categories: vec![food, transport, home],
        accounts: vec![cash, bank],
    }
}
