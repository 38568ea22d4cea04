use std::collections::VecDeque;

use strum_macros::{Display, IntoStaticStr};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{
    common::{
        error::TradeError,
        types::{NodeAddress, PubKeyRing, TradeId},
    },
    protocol::{
        chain_for_message, InterceptHook, MailboxMessage, ProtocolServices, TaskChain, TaskRunner,
    },
};

use super::{Trade, TradeState};

#[derive(Clone, Debug, PartialEq)]
pub enum TradeNotif {
    StateChanged {
        trade_id: TradeId,
        state: TradeState,
    },
    ChainFailed {
        trade_id: TradeId,
        chain: &'static str,
        error: String,
    },
}

#[derive(Clone)]
pub struct TradeAccess {
    tx: mpsc::Sender<TradeRequest>,
}

impl TradeAccess {
    pub(super) fn new(tx: mpsc::Sender<TradeRequest>) -> Self {
        Self { tx }
    }

    /// Runs `chain` against the trade once every earlier request has finished.
    pub async fn run_chain(&self, chain: TaskChain) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TradeRequest::RunChain { chain, rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn handle_mailbox_message(
        &self,
        message: Box<dyn MailboxMessage>,
    ) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TradeRequest::HandleMailboxMessage { message, rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn set_trading_peer(
        &self,
        node_address: NodeAddress,
        pub_key_ring: PubKeyRing,
    ) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TradeRequest::SetTradingPeer {
            node_address,
            pub_key_ring,
            rsp_tx,
        };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn trade(&self) -> Result<Trade, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Trade>();
        let request = TradeRequest::GetTrade { rsp_tx };
        self.tx.send(request).await?;
        Ok(rsp_rx.await?)
    }

    pub async fn register_notif_tx(&self, tx: mpsc::Sender<TradeNotif>) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TradeRequest::RegisterNotifTx { tx, rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    pub async fn unregister_notif_tx(&self) -> Result<(), TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Result<(), TradeError>>();
        let request = TradeRequest::UnregisterNotifTx { rsp_tx };
        self.tx.send(request).await?;
        rsp_rx.await?
    }

    /// Stops the actor and hands back the final trade snapshot.
    pub async fn shutdown(&self) -> Result<Trade, TradeError> {
        let (rsp_tx, rsp_rx) = oneshot::channel::<Trade>();
        let request = TradeRequest::Shutdown { rsp_tx };
        self.tx.send(request).await?; // Shutdown is allowed to fail if already shutdown
        Ok(rsp_rx.await?)
    }
}

/// Owns one trade on a dedicated task. All access goes through [`TradeAccess`], so chains
/// of the same trade never overlap while different trades progress independently.
pub struct TradeEngine {
    trade_id: TradeId,
    tx: mpsc::Sender<TradeRequest>,
    pub(crate) task_handle: tokio::task::JoinHandle<()>,
}

impl TradeEngine {
    pub fn new(
        trade: Trade,
        services: ProtocolServices,
        request_channel_size: usize,
        intercept_hook: Option<InterceptHook>,
    ) -> Self {
        let trade_id = trade.id().to_string();
        let (tx, rx) = mpsc::channel::<TradeRequest>(request_channel_size);
        let actor = TradeActor::new(rx, trade, services, intercept_hook);
        let task_handle = tokio::spawn(async move { actor.run().await });
        Self {
            trade_id,
            tx,
            task_handle,
        }
    }

    pub fn trade_id(&self) -> &str {
        &self.trade_id
    }

    pub fn new_accessor(&self) -> TradeAccess {
        TradeAccess::new(self.tx.clone())
    }
}

#[derive(Display, IntoStaticStr)]
pub(super) enum TradeRequest {
    RunChain {
        chain: TaskChain,
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    HandleMailboxMessage {
        message: Box<dyn MailboxMessage>,
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    SetTradingPeer {
        node_address: NodeAddress,
        pub_key_ring: PubKeyRing,
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    GetTrade {
        rsp_tx: oneshot::Sender<Trade>,
    },
    RegisterNotifTx {
        tx: mpsc::Sender<TradeNotif>,
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    UnregisterNotifTx {
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
    },
    Shutdown {
        rsp_tx: oneshot::Sender<Trade>,
    },
}

/// How a chain run by the actor ended.
enum ChainExit {
    Finished(Result<(), TradeError>),
    /// Shutdown arrived while the chain waited on a delivery. The chain was dropped.
    Shutdown,
}

struct TradeActor {
    rx: mpsc::Receiver<TradeRequest>,
    trade: Trade,
    services: ProtocolServices,
    intercept_hook: Option<InterceptHook>,
    notif_tx: Option<mpsc::Sender<TradeNotif>>,
    // Requests that arrived during a chain and must wait for it to end
    deferred: VecDeque<TradeRequest>,
}

impl TradeActor {
    fn new(
        rx: mpsc::Receiver<TradeRequest>,
        trade: Trade,
        services: ProtocolServices,
        intercept_hook: Option<InterceptHook>,
    ) -> Self {
        TradeActor {
            rx,
            trade,
            services,
            intercept_hook,
            notif_tx: None,
            deferred: VecDeque::new(),
        }
    }

    async fn run(mut self) {
        loop {
            let request = match self.deferred.pop_front() {
                Some(request) => request,
                None => match self.rx.recv().await {
                    Some(request) => request,
                    None => break,
                },
            };
            if self.handle_request(request).await {
                break;
            }
        }
        info!("Trade w/ ID {} actor terminating", self.trade.id());
    }

    // Top-down Request Handling

    async fn handle_request(&mut self, request: TradeRequest) -> bool {
        let mut terminate = false;

        debug!(
            "Trade w/ ID {} handle_request() of type {}",
            self.trade.id(),
            request
        );

        match request {
            TradeRequest::RunChain { chain, rsp_tx } => {
                let exit = self.run_chain(chain, None).await;
                terminate = self.respond_chain_exit(rsp_tx, exit);
            }
            TradeRequest::HandleMailboxMessage { message, rsp_tx } => {
                let exit = self.handle_mailbox_message(message).await;
                terminate = self.respond_chain_exit(rsp_tx, exit);
            }
            TradeRequest::SetTradingPeer {
                node_address,
                pub_key_ring,
                rsp_tx,
            } => {
                let result = self.set_trading_peer(node_address, pub_key_ring);
                Self::respond(self.trade.id(), rsp_tx, result);
            }
            TradeRequest::GetTrade { rsp_tx } => {
                Self::respond(self.trade.id(), rsp_tx, self.trade.clone());
            }
            TradeRequest::RegisterNotifTx { tx, rsp_tx } => {
                let result = Self::register_notif_tx(self.trade.id(), &mut self.notif_tx, tx);
                Self::respond(self.trade.id(), rsp_tx, result);
            }
            TradeRequest::UnregisterNotifTx { rsp_tx } => {
                let result = Self::unregister_notif_tx(self.trade.id(), &mut self.notif_tx);
                Self::respond(self.trade.id(), rsp_tx, result);
            }
            TradeRequest::Shutdown { rsp_tx } => {
                Self::respond(self.trade.id(), rsp_tx, self.trade.clone());
                terminate = true;
            }
        }
        terminate
    }

    /// Serves a request that arrives while a chain waits on a delivery outcome. Reads
    /// answer from the last committed snapshot. Requests that would touch the trade are
    /// deferred until the chain ends. Returns whether the actor should terminate.
    fn handle_request_during_chain(
        trade_id: &str,
        request: TradeRequest,
        committed: &watch::Receiver<Trade>,
        deferred: &mut VecDeque<TradeRequest>,
        notif_tx: &mut Option<mpsc::Sender<TradeNotif>>,
    ) -> bool {
        debug!(
            "Trade w/ ID {} handle_request() of type {} during task chain",
            trade_id, request
        );

        match request {
            TradeRequest::GetTrade { rsp_tx } => {
                Self::respond(trade_id, rsp_tx, committed.borrow().clone());
            }
            TradeRequest::RegisterNotifTx { tx, rsp_tx } => {
                let result = Self::register_notif_tx(trade_id, notif_tx, tx);
                Self::respond(trade_id, rsp_tx, result);
            }
            TradeRequest::UnregisterNotifTx { rsp_tx } => {
                let result = Self::unregister_notif_tx(trade_id, notif_tx);
                Self::respond(trade_id, rsp_tx, result);
            }
            TradeRequest::Shutdown { rsp_tx } => {
                warn!(
                    "Trade w/ ID {} shutting down with a task chain pending, dropping {} deferred requests",
                    trade_id,
                    deferred.len()
                );
                deferred.clear();
                Self::respond(trade_id, rsp_tx, committed.borrow().clone());
                return true;
            }
            request @ (TradeRequest::RunChain { .. }
            | TradeRequest::HandleMailboxMessage { .. }
            | TradeRequest::SetTradingPeer { .. }) => {
                deferred.push_back(request);
            }
        }
        false
    }

    fn respond_chain_exit(
        &self,
        rsp_tx: oneshot::Sender<Result<(), TradeError>>,
        exit: ChainExit,
    ) -> bool {
        match exit {
            ChainExit::Finished(result) => {
                Self::respond(self.trade.id(), rsp_tx, result);
                false
            }
            ChainExit::Shutdown => {
                let error = TradeError::Simple(format!(
                    "Trade w/ ID {} shut down before its task chain finished",
                    self.trade.id()
                ));
                Self::respond(self.trade.id(), rsp_tx, Err(error));
                true
            }
        }
    }

    fn respond<T>(trade_id: &str, rsp_tx: oneshot::Sender<T>, response: T) {
        if rsp_tx.send(response).is_err() {
            warn!(
                "Trade w/ ID {} requester dropped before the response was sent",
                trade_id
            );
        }
    }

    async fn run_chain(
        &mut self,
        chain: TaskChain,
        message: Option<&(dyn MailboxMessage + 'static)>,
    ) -> ChainExit {
        let trade_id = self.trade.id().to_string();
        let chain_name = chain.name();
        let state_before = self.trade.state();

        let mut runner = TaskRunner::new(self.services.clone(), chain);
        if let Some(hook) = &self.intercept_hook {
            runner.intercept_hook(hook.clone());
        }
        if let Some(notif_tx) = self.notif_tx.clone() {
            let failed_notif_tx = notif_tx.clone();
            runner.on_complete(move |trade| {
                if trade.state() != state_before {
                    Self::notify(
                        &notif_tx,
                        TradeNotif::StateChanged {
                            trade_id: trade.id().to_string(),
                            state: trade.state(),
                        },
                    );
                }
            });
            runner.on_failed(move |trade, error| {
                Self::notify(
                    &failed_notif_tx,
                    TradeNotif::ChainFailed {
                        trade_id: trade.id().to_string(),
                        chain: chain_name,
                        error: error.to_string(),
                    },
                );
            });
        }

        let (committed_tx, committed_rx) = watch::channel(self.trade.clone());
        runner.on_progress(move |trade| {
            committed_tx.send_replace(trade.clone());
        });

        debug!("Trade w/ ID {} starting task chain {}", trade_id, chain_name);
        let chain_run = runner.run(&mut self.trade, message);
        tokio::pin!(chain_run);
        let mut rx_open = true;

        // The chain may wait on a delivery outcome indefinitely; keep serving requests
        loop {
            tokio::select! {
                result = &mut chain_run => return ChainExit::Finished(result),
                request = self.rx.recv(), if rx_open => match request {
                    Some(request) => {
                        let terminate = Self::handle_request_during_chain(
                            &trade_id,
                            request,
                            &committed_rx,
                            &mut self.deferred,
                            &mut self.notif_tx,
                        );
                        if terminate {
                            return ChainExit::Shutdown;
                        }
                    }
                    None => rx_open = false,
                },
            }
        }
    }

    async fn handle_mailbox_message(&mut self, message: Box<dyn MailboxMessage>) -> ChainExit {
        if message.trade_id() != self.trade.id() {
            return ChainExit::Finished(Err(TradeError::Validation(format!(
                "Trade w/ ID {} received {} for trade {}",
                self.trade.id(),
                message.message_name(),
                message.trade_id()
            ))));
        }

        debug!(
            "Trade w/ ID {} received {} from {}",
            self.trade.id(),
            message.message_name(),
            message.sender_node_address()
        );
        let chain = match chain_for_message(self.trade.role(), message.as_ref()) {
            Ok(chain) => chain,
            Err(error) => return ChainExit::Finished(Err(error)),
        };
        self.run_chain(chain, Some(message.as_ref())).await
    }

    fn set_trading_peer(
        &mut self,
        node_address: NodeAddress,
        pub_key_ring: PubKeyRing,
    ) -> Result<(), TradeError> {
        self.trade.set_trading_peer(node_address, pub_key_ring)?;
        self.services.trade_store.persist(&self.trade)
    }

    fn register_notif_tx(
        trade_id: &str,
        notif_tx: &mut Option<mpsc::Sender<TradeNotif>>,
        tx: mpsc::Sender<TradeNotif>,
    ) -> Result<(), TradeError> {
        if notif_tx.is_some() {
            return Err(TradeError::Simple(format!(
                "Trade w/ ID {} already has a notification channel registered",
                trade_id
            )));
        }
        *notif_tx = Some(tx);
        Ok(())
    }

    fn unregister_notif_tx(
        trade_id: &str,
        notif_tx: &mut Option<mpsc::Sender<TradeNotif>>,
    ) -> Result<(), TradeError> {
        if notif_tx.take().is_none() {
            return Err(TradeError::Simple(format!(
                "Trade w/ ID {} has no notification channel to unregister",
                trade_id
            )));
        }
        Ok(())
    }

    fn notify(notif_tx: &mpsc::Sender<TradeNotif>, notif: TradeNotif) {
        if let Some(error) = notif_tx.try_send(notif).err() {
            warn!("Trade notification not delivered - {}", error);
        }
    }
}
