//! A request-scoped transaction on top of a process-wide pool.
//!
//! Run with `RUST_LOG=sanduq_container=debug` to watch construction and
//! teardown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sanduq::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Settings {
    dsn: &'static str,
}

struct Pool {
    dsn: &'static str,
}

struct PoolLease {
    dsn: &'static str,
}

#[async_trait]
impl AsyncResource for PoolLease {
    type Output = Pool;

    async fn enter(&mut self) -> std::result::Result<Pool, BoxError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        info!(dsn = self.dsn, "pool connected");
        Ok(Pool { dsn: self.dsn })
    }

    async fn exit(self: Box<Self>) -> std::result::Result<(), BoxError> {
        info!(dsn = self.dsn, "pool drained");
        Ok(())
    }
}

struct Transaction {
    id: usize,
    pool: Arc<Pool>,
}

struct TransactionLease {
    id: usize,
    pool: Arc<Pool>,
}

impl Resource for TransactionLease {
    type Output = Transaction;

    fn enter(&mut self) -> std::result::Result<Transaction, BoxError> {
        info!(id = self.id, "begin");
        Ok(Transaction {
            id: self.id,
            pool: self.pool.clone(),
        })
    }

    fn exit(self: Box<Self>) -> std::result::Result<(), BoxError> {
        info!(id = self.id, "commit");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ids = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let container = Container::builder()
        .provider(Provider::object(Settings { dsn: "postgres://localhost/app" }))
        .provider(
            Provider::builder(Lifetime::Singleton)
                .depends_on(Dependency::of::<Settings>("settings"))
                .async_resource_factory(|args| {
                    let settings = args.get::<Settings>("settings")?;
                    Ok::<_, SanduqError>(PoolLease { dsn: settings.dsn })
                })
                .build()?,
        )
        .provider(
            Provider::builder(Lifetime::Scoped)
                .depends_on(Dependency::of::<Pool>("pool"))
                .resource_factory(move |args| {
                    let id = ids.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok::<_, SanduqError>(TransactionLease {
                        id,
                        pool: args.get::<Pool>("pool")?,
                    })
                })
                .build()?,
        )
        .build()?;

    let requests: Vec<_> = (0..3)
        .map(|_| {
            let container = container.clone();
            tokio::spawn(async move {
                let scope = container.context();
                let tx = scope.resolve::<Transaction>().await?;
                info!(id = tx.id, dsn = tx.pool.dsn, "handling request");
                scope.aclose().await
            })
        })
        .collect();

    for request in requests {
        request.await??;
    }

    container.aclose().await?;
    Ok(())
}
