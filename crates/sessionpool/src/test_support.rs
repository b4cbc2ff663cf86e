//! In-crate stub connection for unit tests.
//!
//! The scriptable mock used by the integration tests lives in
//! `sessionpool-testing`; this one only records session state.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connection::{
    Metadata, RawConnection, ServerInfo, SessionSettings, StatementHandle, TransactionControl,
};
use crate::error::{Error, Result};
use crate::session::IsolationLevel;

#[derive(Debug, Default)]
pub(crate) struct StubState {
    pub auto_commit: bool,
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub catalog: Option<String>,
    pub closed: bool,
    pub rollbacks: u32,
    pub prepares: u32,
    pub unprepared: Vec<StatementHandle>,
    pub fail_setters: bool,
    pub fail_rollback: bool,
    pub log: Vec<&'static str>,
}

pub(crate) struct StubConnection {
    state: Arc<Mutex<StubState>>,
}

impl StubConnection {
    pub(crate) fn new() -> (Box<dyn RawConnection>, Arc<Mutex<StubState>>) {
        let state = Arc::new(Mutex::new(StubState {
            auto_commit: true,
            ..StubState::default()
        }));
        let conn = Self {
            state: Arc::clone(&state),
        };
        (Box::new(conn), state)
    }

    fn setter(&self, name: &'static str) -> Result<parking_lot::MutexGuard<'_, StubState>> {
        let mut state = self.state.lock();
        if state.fail_setters {
            return Err(Error::Database {
                code: 5000,
                message: format!("{name} rejected"),
            });
        }
        state.log.push(name);
        Ok(state)
    }
}

impl SessionSettings for StubConnection {
    fn set_auto_commit(&mut self, auto_commit: bool) -> Result<()> {
        self.setter("set_auto_commit")?.auto_commit = auto_commit;
        Ok(())
    }

    fn auto_commit(&mut self) -> Result<bool> {
        Ok(self.state.lock().auto_commit)
    }

    fn set_transaction_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.setter("set_transaction_isolation")?.isolation = level;
        Ok(())
    }

    fn transaction_isolation(&mut self) -> Result<IsolationLevel> {
        Ok(self.state.lock().isolation)
    }

    fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        self.setter("set_read_only")?.read_only = read_only;
        Ok(())
    }

    fn is_read_only(&mut self) -> Result<bool> {
        Ok(self.state.lock().read_only)
    }

    fn set_catalog(&mut self, catalog: Option<&str>) -> Result<()> {
        self.setter("set_catalog")?.catalog = catalog.map(str::to_owned);
        Ok(())
    }

    fn catalog(&mut self) -> Result<Option<String>> {
        Ok(self.state.lock().catalog.clone())
    }
}

impl TransactionControl for StubConnection {
    fn commit(&mut self) -> Result<()> {
        self.state.lock().log.push("commit");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_rollback {
            return Err(Error::Database {
                code: 3903,
                message: "no transaction".into(),
            });
        }
        state.rollbacks += 1;
        state.log.push("rollback");
        Ok(())
    }
}

impl Metadata for StubConnection {
    fn server_info(&mut self) -> Result<ServerInfo> {
        Ok(ServerInfo {
            product_name: "stub".into(),
            product_version: "1.0".into(),
        })
    }

    fn is_valid(&mut self) -> Result<bool> {
        Ok(!self.state.lock().closed)
    }
}

impl RawConnection for StubConnection {
    fn prepare(&mut self, _sql: &str) -> Result<StatementHandle> {
        let mut state = self.state.lock();
        state.prepares += 1;
        Ok(state.prepares as StatementHandle)
    }

    fn unprepare(&mut self, handle: StatementHandle) -> Result<()> {
        self.state.lock().unprepared.push(handle);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
