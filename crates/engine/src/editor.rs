use std::sync::Arc;

use tracing::debug;

use crate::{
    ResultEngine,
    persistence::{Persistence, PersistenceError},
    reconcile::{self, SaveReport},
    session::Session,
    store::Snapshot,
};

/// Drives a [`Session`] against a persistence backend.
///
/// The session itself stays synchronous; the editor runs the network calls
/// between the `begin_*` and `finish_*` halves of reload and save.
#[derive(Debug)]
pub struct Editor<P> {
    session: Session,
    backend: Arc<P>,
}

impl<P: Persistence> Editor<P> {
    pub fn new(backend: Arc<P>) -> Self {
        Self {
            session: Session::new(),
            backend,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn backend(&self) -> &Arc<P> {
        &self.backend
    }

    /// Fetches everything and replaces the session state with it.
    ///
    /// A future dropped before completion leaves the session loading; see
    /// [`Session::abort_reload`].
    pub async fn reload(&mut self) -> ResultEngine<()> {
        self.session.begin_reload()?;
        let result = fetch_snapshot(self.backend.as_ref()).await;
        self.session.finish_reload(result)
    }

    /// Saves the staged edits, then reloads to re-baseline on what the
    /// backend stored.
    ///
    /// A future dropped mid-save leaves the session locked; see
    /// [`Session::abort_save`].
    pub async fn save(&mut self) -> ResultEngine<SaveReport> {
        let plan = self.session.begin_save()?;
        if plan.is_empty() {
            debug!("nothing to save");
        }
        let result = reconcile::execute(plan, self.backend.as_ref()).await;
        let report = self.session.finish_save(result)?;
        self.reload().await?;
        Ok(report)
    }
}

async fn fetch_snapshot<P: Persistence>(backend: &P) -> Result<Snapshot, PersistenceError> {
    Ok(Snapshot {
        transactions: backend.fetch_transactions().await?,
        categories: backend.fetch_categories().await?,
        accounts: backend.fetch_accounts().await?,
    })
}
