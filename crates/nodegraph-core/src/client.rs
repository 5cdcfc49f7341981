//! The client: a driver, its configuration and a middleware chain.

use std::sync::Arc;

use nodegraph_sql::{Dialect, Value};
use tracing::debug;

use crate::config::ClientConfig;
use crate::context::Context;
use crate::driver::{DebugDriver, Driver, DriverError, TxDriver};
use crate::entity::Entity;
use crate::error::Error;
use crate::graph::step::StepSource;
use crate::middleware::{Middleware, Next, Operation, Outcome, Terminal};
use crate::mutation::{Create, CreateBulk, Delete, DeleteOne, Update, UpdateOne};
use crate::query::Query;

#[derive(Clone)]
enum Handle {
    Direct(Arc<dyn Driver>),
    Tx {
        tx: Arc<dyn TxDriver>,
        base: Arc<dyn Driver>,
    },
}

/// Entry point for queries and mutations.
///
/// Cloning is cheap; clones share the driver, configuration and middleware.
#[derive(Clone)]
pub struct Client {
    handle: Handle,
    config: Arc<ClientConfig>,
    middleware: Arc<Vec<Arc<dyn Middleware>>>,
}

impl Client {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_config(driver, ClientConfig::default())
    }

    /// Create a client; with `debug` set every statement is logged.
    pub fn with_config(driver: Arc<dyn Driver>, config: ClientConfig) -> Self {
        let driver: Arc<dyn Driver> = if config.debug {
            Arc::new(DebugDriver::new(driver, config.log_args))
        } else {
            driver
        };
        Self {
            handle: Handle::Direct(driver),
            config: Arc::new(config),
            middleware: Arc::new(Vec::new()),
        }
    }

    /// Append a middleware. Middleware runs in registration order, the first
    /// registered being outermost.
    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        Arc::make_mut(&mut self.middleware).push(Arc::new(m));
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The driver statements run on; transaction-scoped inside a [`Tx`].
    pub fn driver(&self) -> &dyn Driver {
        match &self.handle {
            Handle::Direct(d) => d.as_ref(),
            Handle::Tx { tx, .. } => tx.driver(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.driver().dialect()
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self.handle, Handle::Tx { .. })
    }

    /// Begin a transaction.
    pub fn tx(&self, ctx: &Context) -> Result<Tx, Error> {
        let base = match &self.handle {
            Handle::Direct(d) => d.clone(),
            Handle::Tx { .. } => {
                return Err(Error::InvalidSpec(
                    "cannot start a transaction within a transaction".into(),
                ))
            }
        };
        if !base.supports_tx() {
            return Err(Error::Driver(DriverError::new(format!(
                "{} driver does not support transactions",
                base.dialect()
            ))));
        }
        let tx = base
            .begin(ctx)
            .map_err(|e| Error::from_driver(base.dialect(), e))?;
        debug!(dialect = %base.dialect(), "transaction started");
        Ok(Tx {
            client: Client {
                handle: Handle::Tx { tx, base },
                config: self.config.clone(),
                middleware: self.middleware.clone(),
            },
        })
    }

    /// A client on the underlying driver, outside the transaction this
    /// client is scoped to.
    pub fn detach(&self) -> Result<Client, Error> {
        match &self.handle {
            Handle::Tx { base, .. } => Ok(Client {
                handle: Handle::Direct(base.clone()),
                config: self.config.clone(),
                middleware: self.middleware.clone(),
            }),
            Handle::Direct(_) => Err(Error::NotTransactional),
        }
    }

    pub fn query<E: Entity>(&self) -> Query<E> {
        Query::new(self.clone())
    }

    pub fn create<E: Entity>(&self) -> Create<E> {
        Create::new(self.clone())
    }

    pub fn create_bulk<E: Entity>(&self, builders: Vec<Create<E>>) -> CreateBulk<E> {
        CreateBulk::new(self.clone(), builders)
    }

    pub fn update<E: Entity>(&self) -> Update<E> {
        Update::new(self.clone())
    }

    pub fn update_one<E: Entity>(&self, node: &E) -> UpdateOne<E> {
        UpdateOne::new(self.clone(), node.id())
    }

    pub fn update_one_id<E: Entity>(&self, id: impl Into<Value>) -> UpdateOne<E> {
        UpdateOne::new(self.clone(), id.into())
    }

    pub fn delete<E: Entity>(&self) -> Delete<E> {
        Delete::new(self.clone())
    }

    pub fn delete_one<E: Entity>(&self, node: &E) -> DeleteOne<E> {
        DeleteOne::new(self.clone(), node.id())
    }

    pub fn delete_one_id<E: Entity>(&self, id: impl Into<Value>) -> DeleteOne<E> {
        DeleteOne::new(self.clone(), id.into())
    }

    /// Query the neighbors of `node` along `edge`.
    pub fn query_edge_of<E: Entity, N: Entity>(&self, node: &E, edge: &str) -> Query<N> {
        Query::traverse(self.clone(), E::schema(), edge, StepSource::Id(node.id()))
    }

    /// Run an operation through the middleware chain, then `terminal`.
    pub(crate) fn run(
        &self,
        ctx: &Context,
        op: &mut Operation<'_>,
        terminal: &mut Terminal<'_>,
    ) -> Result<Outcome, Error> {
        Next::new(&self.middleware, terminal).run(ctx, op)
    }
}

/// A transaction and the client scoped to it.
pub struct Tx {
    client: Client,
}

impl Tx {
    /// The transaction-scoped client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn commit(self) -> Result<(), Error> {
        self.finish(true)
    }

    pub fn rollback(self) -> Result<(), Error> {
        self.finish(false)
    }

    fn finish(self, commit: bool) -> Result<(), Error> {
        let Handle::Tx { tx, base } = &self.client.handle else {
            return Err(Error::NotTransactional);
        };
        let result = if commit { tx.commit() } else { tx.rollback() };
        debug!(commit, "transaction finished");
        result.map_err(|e| Error::from_driver(base.dialect(), e))
    }
}
