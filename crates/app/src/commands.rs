use chrono::NaiveDate;
use engine::Placement;

pub const HELP: &str = "\
list                          show the ledger (ids are shown shortened)
fold <tx>                     fold or unfold a multi-item transaction
name <tx> <text>              rename a transaction
date <tx> <YYYY-MM-DD>        move a transaction to another date
item <item> name <text>       edit an item field; amount <value>,
                              category <name|->, account <name|->
move <date> <from> <to>       reorder transactions inside a date
move-item <tx> <from> <to>    reorder items (the first item is 1)
new <date> [index]            stage a transaction with one item
new-item <item> above|below   stage an item next to another one
delete <id> | restore <id>    stage or unstage a deletion
category|account list|new <name>|rename <id> <name>|move <from> <to>|delete <id>|restore <id>
account amount <id> <value>   set an account starting amount
undo | redo                   walk the history
save | discard | reload       sync with the backend
status | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFieldArg {
    Name(String),
    Amount(String),
    /// `None` clears the category.
    Category(Option<String>),
    Account(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Category,
    Account,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogAction {
    List,
    New(String),
    Rename { id: String, name: String },
    StartingAmount { id: String, amount: String },
    Move { from: usize, to: usize },
    Delete(String),
    Restore(String),
}

/// A parsed input line. Record ids are kept as typed (any unique prefix).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Status,
    Fold(String),
    Name { transaction: String, name: String },
    Date { transaction: String, date: NaiveDate },
    Item { item: String, field: ItemFieldArg },
    Move { date: NaiveDate, from: usize, to: usize },
    MoveItem { transaction: String, from: usize, to: usize },
    New { date: NaiveDate, index: usize },
    NewItem { item: String, placement: Placement },
    Delete(String),
    Restore(String),
    Catalog { kind: CatalogKind, action: CatalogAction },
    Undo,
    Redo,
    Save,
    Discard,
    Reload,
    Quit,
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("invalid date: {raw}"))
}

fn parse_index(raw: &str) -> Result<usize, String> {
    raw.parse().map_err(|_| format!("invalid index: {raw}"))
}

fn required<'a>(parts: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str, String> {
    parts.next().ok_or_else(|| format!("missing {what}"))
}

/// `-` stands for "unassigned".
fn optional_ref(raw: &str) -> Option<String> {
    (raw != "-").then(|| raw.to_string())
}

fn parse_catalog(kind: CatalogKind, rest: &str) -> Result<Command, String> {
    let (verb, tail) = split_word(rest);
    let mut parts = tail.split_whitespace();
    let action = match verb {
        "" | "list" => CatalogAction::List,
        "new" if !tail.is_empty() => CatalogAction::New(tail.to_string()),
        "new" => return Err("missing name".to_string()),
        "rename" => {
            let (id, name) = split_word(tail);
            if id.is_empty() || name.is_empty() {
                return Err("usage: rename <id> <name>".to_string());
            }
            CatalogAction::Rename {
                id: id.to_string(),
                name: name.to_string(),
            }
        }
        "amount" if kind == CatalogKind::Account => CatalogAction::StartingAmount {
            id: required(&mut parts, "id")?.to_string(),
            amount: required(&mut parts, "amount")?.to_string(),
        },
        "move" => CatalogAction::Move {
            from: parse_index(required(&mut parts, "from index")?)?,
            to: parse_index(required(&mut parts, "to index")?)?,
        },
        "delete" => CatalogAction::Delete(required(&mut parts, "id")?.to_string()),
        "restore" => CatalogAction::Restore(required(&mut parts, "id")?.to_string()),
        other => return Err(format!("unknown {kind:?} action: {other}").to_lowercase()),
    };
    Ok(Command::Catalog { kind, action })
}

/// Splits off the first word; the rest keeps its inner spacing.
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

pub fn parse(input: &str) -> Result<Command, String> {
    let (verb, rest) = split_word(input);
    let mut parts = rest.split_whitespace();

    let command = match verb {
        "help" | "?" => Command::Help,
        "list" | "ls" => Command::List,
        "status" => Command::Status,
        "fold" => Command::Fold(required(&mut parts, "transaction id")?.to_string()),
        "name" => {
            let (transaction, name) = split_word(rest);
            if transaction.is_empty() {
                return Err("missing transaction id".to_string());
            }
            Command::Name {
                transaction: transaction.to_string(),
                name: name.to_string(),
            }
        }
        "date" => Command::Date {
            transaction: required(&mut parts, "transaction id")?.to_string(),
            date: parse_date(required(&mut parts, "date")?)?,
        },
        "item" => {
            let item = required(&mut parts, "item id")?.to_string();
            let key = required(&mut parts, "field")?;
            let value = split_word(split_word(rest).1).1;
            let field = match key {
                "name" => ItemFieldArg::Name(value.to_string()),
                "amount" => ItemFieldArg::Amount(value.to_string()),
                "category" => ItemFieldArg::Category(optional_ref(required(&mut parts, "category")?)),
                "account" => ItemFieldArg::Account(optional_ref(required(&mut parts, "account")?)),
                other => return Err(format!("unknown item field: {other}")),
            };
            Command::Item { item, field }
        }
        "move" => Command::Move {
            date: parse_date(required(&mut parts, "date")?)?,
            from: parse_index(required(&mut parts, "from index")?)?,
            to: parse_index(required(&mut parts, "to index")?)?,
        },
        "move-item" => Command::MoveItem {
            transaction: required(&mut parts, "transaction id")?.to_string(),
            from: parse_index(required(&mut parts, "from index")?)?,
            to: parse_index(required(&mut parts, "to index")?)?,
        },
        "new" => Command::New {
            date: parse_date(required(&mut parts, "date")?)?,
            index: parts.next().map(parse_index).transpose()?.unwrap_or(0),
        },
        "new-item" => Command::NewItem {
            item: required(&mut parts, "item id")?.to_string(),
            placement: match parts.next() {
                Some("above") => Placement::Above,
                Some("below") | None => Placement::Below,
                Some(other) => return Err(format!("expected above or below, got {other}")),
            },
        },
        "delete" | "rm" => Command::Delete(required(&mut parts, "id")?.to_string()),
        "restore" => Command::Restore(required(&mut parts, "id")?.to_string()),
        "category" | "cat" => return parse_catalog(CatalogKind::Category, rest),
        "account" | "acct" => return parse_catalog(CatalogKind::Account, rest),
        "undo" => Command::Undo,
        "redo" => Command::Redo,
        "save" => Command::Save,
        "discard" => Command::Discard,
        "reload" => Command::Reload,
        "quit" | "exit" | "q" => Command::Quit,
        "" => return Err("empty command".to_string()),
        other => return Err(format!("unknown command: {other} (try help)")),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_name_keeps_spaces() {
        assert_eq!(
            parse("name 3fa2  Weekly   groceries ").unwrap(),
            Command::Name {
                transaction: "3fa2".to_string(),
                name: "Weekly   groceries".to_string(),
            }
        );
    }

    #[test]
    fn parse_item_fields() {
        assert_eq!(
            parse("item ab12 amount 12,50").unwrap(),
            Command::Item {
                item: "ab12".to_string(),
                field: ItemFieldArg::Amount("12,50".to_string()),
            }
        );
        assert_eq!(
            parse("item ab12 name Oat milk").unwrap(),
            Command::Item {
                item: "ab12".to_string(),
                field: ItemFieldArg::Name("Oat milk".to_string()),
            }
        );
        assert_eq!(
            parse("item ab12 category -").unwrap(),
            Command::Item {
                item: "ab12".to_string(),
                field: ItemFieldArg::Category(None),
            }
        );
        assert!(parse("item ab12 colour red").is_err());
    }

    #[test]
    fn parse_moves_and_creation() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            parse("move 2024-05-01 2 0").unwrap(),
            Command::Move {
                date,
                from: 2,
                to: 0
            }
        );
        assert_eq!(parse("new 2024-05-01").unwrap(), Command::New { date, index: 0 });
        assert_eq!(
            parse("new-item ab12 above").unwrap(),
            Command::NewItem {
                item: "ab12".to_string(),
                placement: Placement::Above,
            }
        );
        assert!(parse("move 2024-13-01 0 1").is_err());
        assert!(parse("move-item ab12 x 1").is_err());
    }

    #[test]
    fn parse_catalog_actions() {
        assert_eq!(
            parse("cat rename 9c Eating out").unwrap(),
            Command::Catalog {
                kind: CatalogKind::Category,
                action: CatalogAction::Rename {
                    id: "9c".to_string(),
                    name: "Eating out".to_string(),
                },
            }
        );
        assert_eq!(
            parse("account amount 77 100.00").unwrap(),
            Command::Catalog {
                kind: CatalogKind::Account,
                action: CatalogAction::StartingAmount {
                    id: "77".to_string(),
                    amount: "100.00".to_string(),
                },
            }
        );
        assert_eq!(
            parse("category amount 77 1").unwrap_err(),
            "unknown category action: amount"
        );
    }

    #[test]
    fn parse_rejects_unknown_and_empty() {
        assert_eq!(parse("   ").unwrap_err(), "empty command");
        assert!(parse("frobnicate").is_err());
        assert_eq!(parse("date ab12").unwrap_err(), "missing date");
    }
}
