use std::{fmt::Write as _, io::Write as _, sync::Arc};

use api_types::ledger::Transaction;
use engine::{
    CatalogEditor, CatalogField, CatalogKey, CatalogRecord, Editor, FocusTarget, ItemField,
    Persistence, RecordRef, Session, TransactionField,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

use crate::{
    commands::{self, CatalogAction, CatalogKind, Command, HELP, ItemFieldArg},
    error::{AppError, Result},
};

fn short(id: Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// Picks the single id starting with `prefix`.
fn unique(prefix: &str, ids: impl IntoIterator<Item = Uuid>) -> Result<Uuid> {
    let prefix = prefix.to_lowercase().replace('-', "");
    let mut matches = ids
        .into_iter()
        .filter(|id| id.simple().to_string().starts_with(&prefix));
    match (matches.next(), matches.next()) {
        (Some(id), None) => Ok(id),
        (None, _) => Err(AppError::Command(format!("no record matches {prefix}"))),
        (Some(_), Some(_)) => Err(AppError::Command(format!("{prefix} is ambiguous"))),
    }
}

/// Matches a catalog record by exact name (ignoring case) or by id prefix.
fn catalog_id<R: CatalogRecord>(editor: &CatalogEditor<R>, reference: &str) -> Result<Uuid> {
    let by_name = editor.records().iter().find(|record| {
        matches!(
            record.read(CatalogKey::Name),
            Some(CatalogField::Name(name)) if name.eq_ignore_ascii_case(reference)
        )
    });
    match by_name {
        Some(record) => Ok(record.id()),
        None => unique(reference, editor.records().iter().map(CatalogRecord::id)),
    }
}

fn catalog_name<R: CatalogRecord>(editor: &CatalogEditor<R>, id: Option<Uuid>) -> String {
    match id.and_then(|id| editor.record(id)) {
        Some(record) => match record.read(CatalogKey::Name) {
            Some(CatalogField::Name(name)) => name,
            _ => String::new(),
        },
        None => "-".to_string(),
    }
}

fn catalog_action<R: CatalogRecord>(
    editor: &mut CatalogEditor<R>,
    action: CatalogAction,
) -> Result<String> {
    Ok(match action {
        CatalogAction::List => {
            let mut out = String::new();
            for (index, record) in editor.records().iter().enumerate() {
                let marker = if editor.is_pending_deletion(record.id()) {
                    '-'
                } else if editor.is_pending_creation(record.id()) {
                    '+'
                } else if editor.changes().has_change(record.id()) {
                    '*'
                } else {
                    ' '
                };
                let _ = write!(out, "{marker}[{index}] {} ", short(record.id()));
                if let Some(CatalogField::Name(name)) = record.read(CatalogKey::Name) {
                    let _ = write!(out, "{name}");
                }
                if let Some(CatalogField::StartingAmount(amount)) =
                    record.read(CatalogKey::StartingAmount)
                {
                    let _ = write!(out, " (starts at {amount})");
                }
                out.push('\n');
            }
            out.trim_end().to_string()
        }
        CatalogAction::New(name) => {
            let index = editor.records().len();
            let id = editor.create(index)?;
            editor.rename(id, name)?;
            format!("staged {} {}", R::KIND, short(id))
        }
        CatalogAction::Rename { id, name } => {
            let id = catalog_id(editor, &id)?;
            editor.rename(id, name)?;
            "renamed".to_string()
        }
        CatalogAction::StartingAmount { id, amount } => {
            let id = catalog_id(editor, &id)?;
            editor.set_starting_amount(id, amount)?;
            "starting amount set".to_string()
        }
        CatalogAction::Move { from, to } => {
            editor.move_record(from, to)?;
            "moved".to_string()
        }
        CatalogAction::Delete(id) => {
            let id = catalog_id(editor, &id)?;
            if editor.stage_delete(id)? {
                "deletion staged".to_string()
            } else {
                "already staged for deletion".to_string()
            }
        }
        CatalogAction::Restore(id) => {
            let id = catalog_id(editor, &id)?;
            if editor.unstage_delete(id)? {
                "deletion unstaged".to_string()
            } else {
                "not staged for deletion".to_string()
            }
        }
    })
}

fn describe_focus(focus: Option<FocusTarget>) -> String {
    match focus {
        None => "nothing to do".to_string(),
        Some(FocusTarget::TransactionField {
            transaction_id,
            key,
        }) => format!("transaction {} {key:?}", short(transaction_id)),
        Some(FocusTarget::ItemField { item_id, key, .. }) => {
            format!("item {} {key:?}", short(item_id))
        }
        Some(FocusTarget::Transaction(id)) => format!("transaction {}", short(id)),
        Some(FocusTarget::Item { item_id, .. }) => format!("item {}", short(item_id)),
    }
}

pub struct App<P> {
    editor: Editor<P>,
    confirm_quit: bool,
}

impl<P: Persistence> App<P> {
    pub fn new(backend: Arc<P>) -> Self {
        Self {
            editor: Editor::new(backend),
            confirm_quit: false,
        }
    }

    fn session(&self) -> &Session {
        self.editor.session()
    }

    pub async fn run(&mut self) -> Result<()> {
        self.editor.reload().await?;
        println!("{}", self.render_list());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("tally> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match commands::parse(&line) {
                Ok(Command::Quit) => {
                    if !self.session().is_dirty() || self.confirm_quit {
                        break;
                    }
                    self.confirm_quit = true;
                    println!("unsaved changes, quit again to drop them");
                }
                Ok(command) => {
                    self.confirm_quit = false;
                    match self.execute(command).await {
                        Ok(output) => println!("{output}"),
                        Err(err) => {
                            tracing::debug!("command failed: {err}");
                            println!("error: {err}");
                        }
                    }
                }
                Err(message) => println!("{message}"),
            }
        }
        Ok(())
    }

    fn transaction_id(&self, prefix: &str) -> Result<Uuid> {
        unique(
            prefix,
            self.session().store().transactions().iter().map(|t| t.id),
        )
    }

    fn item_ref(&self, prefix: &str) -> Result<(Uuid, Uuid)> {
        let transactions = self.session().store().transactions();
        let item_id = unique(
            prefix,
            transactions.iter().flat_map(|t| t.items.iter().map(|i| i.id)),
        )?;
        let transaction_id = self
            .session()
            .item(item_id)
            .map(|item| item.transaction_id)
            .ok_or_else(|| AppError::Command(format!("no item matches {prefix}")))?;
        Ok((transaction_id, item_id))
    }

    fn record_ref(&self, prefix: &str) -> Result<RecordRef> {
        match self.transaction_id(prefix) {
            Ok(id) => Ok(RecordRef::Transaction(id)),
            Err(_) => {
                let (transaction_id, item_id) = self.item_ref(prefix)?;
                Ok(RecordRef::Item {
                    transaction_id,
                    item_id,
                })
            }
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<String> {
        Ok(match command {
            Command::Help => HELP.to_string(),
            Command::List => self.render_list(),
            Command::Status => self.render_status(),
            Command::Fold(prefix) => {
                let id = self.transaction_id(&prefix)?;
                if self.editor.session_mut().toggle_fold(id) {
                    "expanded".to_string()
                } else {
                    "folded".to_string()
                }
            }
            Command::Name { transaction, name } => {
                let id = self.transaction_id(&transaction)?;
                self.editor
                    .session_mut()
                    .update_transaction(id, TransactionField::Name(name))?;
                "ok".to_string()
            }
            Command::Date { transaction, date } => {
                let id = self.transaction_id(&transaction)?;
                self.editor
                    .session_mut()
                    .update_transaction(id, TransactionField::Date(date))?;
                "ok".to_string()
            }
            Command::Item { item, field } => {
                let (_, item_id) = self.item_ref(&item)?;
                let session = self.session();
                let field = match field {
                    ItemFieldArg::Name(name) => ItemField::Name(name),
                    ItemFieldArg::Amount(amount) => ItemField::Amount(amount),
                    ItemFieldArg::Category(reference) => ItemField::CategoryId(
                        reference
                            .map(|r| catalog_id(session.categories(), &r))
                            .transpose()?,
                    ),
                    ItemFieldArg::Account(reference) => ItemField::AccountId(
                        reference
                            .map(|r| catalog_id(session.accounts(), &r))
                            .transpose()?,
                    ),
                };
                self.editor.session_mut().update_item(item_id, field)?;
                "ok".to_string()
            }
            Command::Move { date, from, to } => {
                self.editor
                    .session_mut()
                    .move_transaction(date, from, to)?;
                "moved".to_string()
            }
            Command::MoveItem {
                transaction,
                from,
                to,
            } => {
                let id = self.transaction_id(&transaction)?;
                self.editor.session_mut().move_item(id, from, to)?;
                "moved".to_string()
            }
            Command::New { date, index } => {
                let id = self
                    .editor
                    .session_mut()
                    .create_transaction(date, index)?;
                format!("staged transaction {}", short(id))
            }
            Command::NewItem { item, placement } => {
                let (transaction_id, item_id) = self.item_ref(&item)?;
                let id = self
                    .editor
                    .session_mut()
                    .create_item(transaction_id, item_id, placement)?;
                format!("staged item {}", short(id))
            }
            Command::Delete(prefix) => {
                let target = self.record_ref(&prefix)?;
                if self.editor.session_mut().stage_delete(target)? {
                    "deletion staged".to_string()
                } else {
                    "already staged for deletion".to_string()
                }
            }
            Command::Restore(prefix) => {
                let target = self.record_ref(&prefix)?;
                if self.editor.session_mut().unstage_delete(target)? {
                    "deletion unstaged".to_string()
                } else {
                    "not staged for deletion".to_string()
                }
            }
            Command::Catalog { kind, action } => {
                let session = self.editor.session_mut();
                match kind {
                    CatalogKind::Category => catalog_action(session.categories_mut()?, action)?,
                    CatalogKind::Account => catalog_action(session.accounts_mut()?, action)?,
                }
            }
            Command::Undo => {
                let focus = self.editor.session_mut().undo()?;
                format!("undone, focus on {}", describe_focus(focus))
            }
            Command::Redo => {
                let focus = self.editor.session_mut().redo()?;
                format!("redone, focus on {}", describe_focus(focus))
            }
            Command::Save => {
                let report = self.editor.save().await?;
                format!(
                    "saved: {} inserted, {} updated, {} deleted",
                    report.inserted, report.upserted, report.deleted
                )
            }
            Command::Discard => {
                self.editor.session_mut().discard()?;
                "discarded".to_string()
            }
            Command::Reload => {
                self.editor.reload().await?;
                self.render_list()
            }
            Command::Quit => String::new(),
        })
    }

    fn marker(&self, id: Uuid) -> char {
        let store = self.session().store();
        if store.is_pending_deletion(id) {
            '-'
        } else if store.is_pending_creation(id) {
            '+'
        } else if store.has_change(id) {
            '*'
        } else {
            ' '
        }
    }

    fn render_transaction(&self, out: &mut String, index: usize, transaction: &Transaction) {
        let session = self.session();
        let total = session
            .transaction_total(transaction.id)
            .map(|total| total.to_string())
            .unwrap_or_else(|_| "?".to_string());
        let items = session.ordered_items(transaction.id);
        let folded = session.is_folded(transaction.id);
        let _ = write!(
            out,
            "{}[{index}] {} {:<24} {:>10}",
            self.marker(transaction.id),
            short(transaction.id),
            transaction.name,
            total
        );
        if items.len() > 1 {
            let _ = write!(
                out,
                "  ({} items{})",
                items.len(),
                if folded { ", folded" } else { "" }
            );
        }
        out.push('\n');
        if folded {
            return;
        }
        for (position, item) in items.iter().enumerate() {
            let _ = writeln!(
                out,
                "    {}[{}] {} {:<20} {:>10}  {} / {}",
                self.marker(item.id),
                position + 1,
                short(item.id),
                item.name,
                item.amount,
                catalog_name(session.categories(), item.category_id),
                catalog_name(session.accounts(), item.account_id),
            );
        }
    }

    fn render_list(&self) -> String {
        let mut out = String::new();
        let order = self.session().sort_order().cur();
        for (date, bucket) in order.iter().rev().filter(|(_, bucket)| !bucket.is_empty()) {
            let _ = writeln!(out, "{date}");
            for (index, entry) in bucket.iter().enumerate() {
                if let Some(transaction) = self.session().transaction(entry.transaction_id()) {
                    self.render_transaction(&mut out, index, transaction);
                }
            }
        }
        if out.is_empty() {
            "no transactions".to_string()
        } else {
            out.trim_end().to_string()
        }
    }

    fn render_status(&self) -> String {
        let session = self.session();
        let store = session.store();
        format!(
            "status: {:?}\nunsaved changes: {}\nstaged creations: {}, deletions: {}\nundo: {}, redo: {}",
            session.status(),
            if session.is_dirty() { "yes" } else { "no" },
            store.pending_creations().count(),
            store.pending_deletions().count(),
            session.history().undo_stack().len(),
            session.history().redo_stack().len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use chrono::NaiveDate;
    use engine::memory::MemoryBackend;

    async fn demo_app() -> (App<MemoryBackend>, Arc<MemoryBackend>) {
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let backend = Arc::new(MemoryBackend::with_snapshot(demo::snapshot(today)));
        let mut app = App::new(Arc::clone(&backend));
        app.editor.reload().await.unwrap();
        (app, backend)
    }

    async fn run(app: &mut App<MemoryBackend>, line: &str) -> Result<String> {
        app.execute(commands::parse(line).unwrap()).await
    }

    #[tokio::test]
    async fn list_shows_newest_date_first_and_folds_groups() {
        let (mut app, _) = demo_app().await;

        let list = run(&mut app, "list").await.unwrap();

        let today = list.find("2024-05-02").unwrap();
        let yesterday = list.find("2024-05-01").unwrap();
        assert!(today < yesterday);
        assert!(list.contains("Supermarket"));
        assert!(list.contains("(3 items, folded)"));
        assert!(!list.contains("Detergent"));
    }

    #[tokio::test]
    async fn item_edit_by_category_name_is_saved() {
        let (mut app, backend) = demo_app().await;
        let salary = app.session().store().transactions()[3].items[0].id;
        let prefix = short(salary);

        run(&mut app, &format!("item {prefix} category food"))
            .await
            .unwrap();
        run(&mut app, &format!("item {prefix} amount 2200"))
            .await
            .unwrap();
        let saved = run(&mut app, "save").await.unwrap();

        assert_eq!(saved, "saved: 0 inserted, 1 updated, 0 deleted");
        let stored = backend.snapshot();
        let item = &stored.transactions[3].items[0];
        assert_eq!(item.amount, "2200.00");
        assert_eq!(item.category_id, Some(stored.categories[0].id));
    }

    #[tokio::test]
    async fn unknown_prefix_is_reported() {
        let (mut app, _) = demo_app().await;

        let err = run(&mut app, "name zzzz Rent").await.unwrap_err();

        assert!(matches!(err, AppError::Command(_)));
    }

    #[tokio::test]
    async fn undo_reports_focus() {
        let (mut app, _) = demo_app().await;
        let rent = app.session().store().transactions()[2].id;

        run(&mut app, &format!("name {} Rent June", short(rent)))
            .await
            .unwrap();
        let undone = run(&mut app, "undo").await.unwrap();

        assert_eq!(
            undone,
            format!("undone, focus on transaction {} Name", short(rent))
        );
        assert_eq!(app.session().transaction(rent).unwrap().name, "Rent");
    }
}
