use std::sync::Arc;

use api_types::{
    catalog::{Account, Category},
    ledger::{Item, Transaction},
};
use chrono::NaiveDate;
use engine::{Editor, Snapshot, memory::MemoryBackend};
use uuid::Uuid;

/// Ids of the seeded rows.
///
/// On `day(1)` `a` sits above `b`; `c` is alone on `day(2)` and has three
/// items. Every item amount is `10.00`.
#[allow(dead_code)]
pub struct Fixture {
    pub a: Uuid,
    pub a_item: Uuid,
    pub b: Uuid,
    pub b_item: Uuid,
    pub c: Uuid,
    pub c_items: [Uuid; 3],
    pub food: Uuid,
    pub rent: Uuid,
    pub cash: Uuid,
}

pub fn day(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
}

fn item(transaction_id: Uuid, name: &str, order_position: i64) -> Item {
    Item {
        id: Uuid::new_v4(),
        transaction_id,
        name: name.to_string(),
        amount: "10.00".to_string(),
        category_id: None,
        account_id: None,
        order_position,
    }
}

fn transaction(date: NaiveDate, name: &str, order_position: i64, items: &[&str]) -> Transaction {
    let id = Uuid::new_v4();
    Transaction {
        id,
        date,
        name: name.to_string(),
        order_position,
        items: items
            .iter()
            .enumerate()
            .map(|(position, name)| item(id, name, position as i64))
            .collect(),
    }
}

/// An editor loaded from a seeded memory backend, with the call log cleared.
pub async fn loaded_editor() -> (Editor<MemoryBackend>, Arc<MemoryBackend>, Fixture) {
    let a = transaction(day(1), "Groceries", 1, &["Milk"]);
    let b = transaction(day(1), "Fuel", 0, &["Diesel"]);
    let c = transaction(day(2), "Market", 0, &["Bread", "Eggs", "Cheese"]);
    let food = Category {
        id: Uuid::new_v4(),
        name: "Food".to_string(),
        order_position: 0,
    };
    let rent = Category {
        id: Uuid::new_v4(),
        name: "Rent".to_string(),
        order_position: 1,
    };
    let cash = Account {
        id: Uuid::new_v4(),
        name: "Cash".to_string(),
        order_position: 0,
        starting_amount: "0.00".to_string(),
    };

    let fixture = Fixture {
        a: a.id,
        a_item: a.items[0].id,
        b: b.id,
        b_item: b.items[0].id,
        c: c.id,
        c_items: [c.items[0].id, c.items[1].id, c.items[2].id],
        food: food.id,
        rent: rent.id,
        cash: cash.id,
    };

    let backend = Arc::new(MemoryBackend::with_snapshot(Snapshot {
        transactions: vec![a, b, c],
        categories: vec![food, rent],
        accounts: vec![cash],
    }));
    let mut editor = Editor::new(Arc::clone(&backend));
    editor.reload().await.unwrap();
    backend.clear_calls();
    (editor, backend, fixture)
}
