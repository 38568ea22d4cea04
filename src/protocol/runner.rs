use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use tracing::{debug, error, info, warn};

use crate::{common::error::TradeError, trade::Trade};

use super::{
    messages::MailboxMessage,
    services::ProtocolServices,
    task::{ProtocolTask, TaskChain, TaskContext, TaskStep},
};

/// Called with the task name before each task body. Returning `Err(reason)` fails the
/// task without running it. Only meant for tests and diagnostics.
pub type InterceptHook = Arc<dyn Fn(&str, &Trade) -> Result<(), String> + Send + Sync>;

pub type ChainCompleteHandler = Box<dyn FnOnce(&Trade) + Send>;
pub type ChainFailedHandler = Box<dyn FnOnce(&Trade, &TradeError) + Send>;
/// Called with the committed trade after each task that completed and was persisted.
pub type ChainProgressHandler = Box<dyn FnMut(&Trade) + Send>;

/// Runs the tasks of one [`TaskChain`] against a trade, strictly one after another, and
/// stops at the first failure.
///
/// Effects of completed tasks are never rolled back. The trade is persisted through
/// [`ProtocolServices::trade_store`] after every completed task and after a failure. A
/// task whose result cannot be persisted counts as failed.
pub struct TaskRunner {
    services: ProtocolServices,
    chain: TaskChain,
    intercept_hook: Option<InterceptHook>,
    complete_handler: Option<ChainCompleteHandler>,
    failed_handler: Option<ChainFailedHandler>,
    progress_handler: Option<ChainProgressHandler>,
}

impl TaskRunner {
    pub fn new(services: ProtocolServices, chain: TaskChain) -> Self {
        Self {
            services,
            chain,
            intercept_hook: None,
            complete_handler: None,
            failed_handler: None,
            progress_handler: None,
        }
    }

    pub fn intercept_hook(&mut self, hook: InterceptHook) -> &mut Self {
        self.intercept_hook = Some(hook);
        self
    }

    pub fn on_progress(&mut self, handler: impl FnMut(&Trade) + Send + 'static) -> &mut Self {
        self.progress_handler = Some(Box::new(handler));
        self
    }

    pub fn on_complete(&mut self, handler: impl FnOnce(&Trade) + Send + 'static) -> &mut Self {
        self.complete_handler = Some(Box::new(handler));
        self
    }

    pub fn on_failed(
        &mut self,
        handler: impl FnOnce(&Trade, &TradeError) + Send + 'static,
    ) -> &mut Self {
        self.failed_handler = Some(Box::new(handler));
        self
    }

    pub async fn run(
        self,
        trade: &mut Trade,
        message: Option<&(dyn MailboxMessage + 'static)>,
    ) -> Result<(), TradeError> {
        let TaskRunner {
            services,
            chain,
            intercept_hook,
            complete_handler,
            failed_handler,
            mut progress_handler,
        } = self;

        if chain.is_empty() {
            return Err(TradeError::EmptyChain(chain.name().to_string()));
        }

        if let Some(role) = chain.role() {
            if role != trade.role() {
                return Err(TradeError::Validation(format!(
                    "Trade w/ ID {} is {} but task chain {} is for {}",
                    trade.id(),
                    trade.role(),
                    chain.name(),
                    role
                )));
            }
        }

        debug!(
            "Trade w/ ID {} running task chain {} with {} tasks from state {}",
            trade.id(),
            chain.name(),
            chain.len(),
            trade.state()
        );

        let mut cursor = 0;
        let mut failure: Option<(&'static str, TradeError)> = None;

        while let Some(mut task) = chain.construct(cursor) {
            let task_name = task.name();
            let result =
                Self::run_task(&services, intercept_hook.as_ref(), task.as_mut(), trade, message)
                    .await;
            drop(task);

            match result.and_then(|()| services.trade_store.persist(trade)) {
                Ok(()) => {
                    debug!("Trade w/ ID {} task {} completed", trade.id(), task_name);
                    if let Some(handler) = progress_handler.as_mut() {
                        handler(trade);
                    }
                    cursor += 1;
                }
                Err(error) => {
                    failure = Some((task_name, error));
                    break;
                }
            }
        }

        match failure {
            None => {
                info!(
                    "Trade w/ ID {} task chain {} completed in state {}",
                    trade.id(),
                    chain.name(),
                    trade.state()
                );
                if let Some(handler) = complete_handler {
                    handler(trade);
                }
                Ok(())
            }
            Some((task_name, error)) => {
                warn!(
                    "Trade w/ ID {} task chain {} failed at task {} ({} of {}) - {}",
                    trade.id(),
                    chain.name(),
                    task_name,
                    cursor + 1,
                    chain.len(),
                    error
                );
                trade.append_to_error_message(format!("{} failed. {}", task_name, error));
                Self::persist(&services, trade);
                if let Some(handler) = failed_handler {
                    handler(trade, &error);
                }
                Err(error)
            }
        }
    }

    async fn run_task(
        services: &ProtocolServices,
        intercept_hook: Option<&InterceptHook>,
        task: &mut dyn ProtocolTask,
        trade: &mut Trade,
        message: Option<&(dyn MailboxMessage + 'static)>,
    ) -> Result<(), TradeError> {
        let task_name = task.name();

        if let Some(hook) = intercept_hook {
            if let Err(reason) = hook(task_name, trade) {
                return Err(TradeError::Intercepted(format!(
                    "{} intercepted - {}",
                    task_name, reason
                )));
            }
        }

        let step = {
            let mut ctx = TaskContext::new(trade, services, message);
            contain_panic(task_name, || task.run(&mut ctx))?
        };

        match step {
            TaskStep::Complete => Ok(()),
            TaskStep::AwaitDelivery(receipt) => {
                let outcome = receipt.outcome().await;
                let mut ctx = TaskContext::new(trade, services, message);
                contain_panic(task_name, || task.on_delivery(&mut ctx, outcome))
            }
        }
    }

    fn persist(services: &ProtocolServices, trade: &Trade) {
        if let Some(error) = services.trade_store.persist(trade).err() {
            error!("Trade w/ ID {} failed to persist - {}", trade.id(), error);
        }
    }
}

fn contain_panic<T>(
    task_name: &str,
    body: impl FnOnce() -> Result<T, TradeError>,
) -> Result<T, TradeError> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => {
            let cause = panic_cause(payload.as_ref());
            error!("Task {} panicked - {}", task_name, cause);
            Err(TradeError::UnexpectedTask(format!(
                "{} panicked - {}",
                task_name, cause
            )))
        }
    }
}

fn panic_cause(payload: &(dyn Any + Send)) -> String {
    if let Some(cause) = payload.downcast_ref::<&str>() {
        cause.to_string()
    } else if let Some(cause) = payload.downcast_ref::<String>() {
        cause.clone()
    } else {
        "unknown cause".to_string()
    }
}
