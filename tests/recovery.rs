mod common;

#[cfg(test)]
mod recovery_tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;
    use uuid::Uuid;

    use crusty_settle::{
        config::TradeManagerConfig,
        manager::TradeManager,
        protocol::{DepositTxPublishedMessage, InterceptHook},
        store::{TradableList, TradeCategory},
        testing::{MailboxBehavior, SomeTestParams, TestMailbox, TestWallet},
        trade::{Trade, TradeState},
        TradeError, TradeErrorKind,
    };

    use super::common::{logger, test_node::TestNode};

    const ANSWER_TIMEOUT: Duration = Duration::from_secs(5);

    async fn open_trade(seller: &TestNode, buyer: &TestNode) -> anyhow::Result<String> {
        let offer = SomeTestParams::seller_offer_with_id(&Uuid::new_v4().to_string());
        let trade_id = offer.id.clone();

        seller.manager.make_trade(offer.clone()).await?;
        buyer
            .manager
            .take_offer(offer, seller.node_address.clone())
            .await?;
        seller
            .manager
            .set_trading_peer(
                &trade_id,
                buyer.node_address.clone(),
                buyer.key_ring.pub_key_ring(),
            )
            .await?;
        Ok(trade_id)
    }

    #[tokio::test]
    async fn test_delivery_fault_halts_trade_until_retry() -> anyhow::Result<()> {
        logger::setup();
        let (seller, mut buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;
        seller
            .mailbox
            .set_behavior(MailboxBehavior::Fault("peer unreachable".to_string()));

        let error = seller.manager.publish_deposit(&trade_id).await.unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::DeliveryFault);

        let halted = seller.manager.get_trade_by_id(&trade_id).await.unwrap();
        assert_eq!(halted.state(), TradeState::SellerPublishedDepositTx);
        assert!(halted
            .error_message()
            .unwrap()
            .contains("SendDepositTxPublishedMessage failed"));
        assert!(buyer.inbox_is_empty());

        seller.mailbox.set_behavior(MailboxBehavior::Arrive);
        seller.manager.publish_deposit(&trade_id).await?;

        let resumed = seller.manager.get_trade_by_id(&trade_id).await.unwrap();
        assert_eq!(resumed.state(), TradeState::SellerSentDepositTxPublishedMsg);
        assert_eq!(
            seller
                .wallet
                .calls()
                .iter()
                .filter(|call| *call == TestWallet::PUBLISH_DEPOSIT_TX)
                .count(),
            1
        );
        assert_eq!(seller.mailbox.send_count(), 2);

        buyer.deliver_next().await?;
        assert_eq!(
            buyer.manager.get_trade_by_id(&trade_id).await.unwrap().state(),
            TradeState::BuyerReceivedDepositTxPublishedMsg
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_wallet_failure_leaves_trade_open() -> anyhow::Result<()> {
        logger::setup();
        let (seller, buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;
        seller
            .wallet
            .fail_on(TestWallet::PUBLISH_DEPOSIT_TX, "insufficient funds");

        let error = seller.manager.publish_deposit(&trade_id).await.unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::Protocol);

        let trade = seller.manager.get_trade_by_id(&trade_id).await.unwrap();
        assert_eq!(trade.state(), TradeState::Preparation);
        assert!(trade.context().deposit_tx.get().is_none());
        assert_eq!(seller.mailbox.send_count(), 0);
        assert_eq!(seller.manager.open_trades().len(), 1);

        seller.wallet.clear_failures();
        seller.manager.publish_deposit(&trade_id).await?;
        assert_eq!(
            seller.manager.get_trade_by_id(&trade_id).await.unwrap().state(),
            TradeState::SellerSentDepositTxPublishedMsg
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_trade_moves_to_failed_registry() -> anyhow::Result<()> {
        logger::setup();
        let (seller, buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;
        seller.manager.publish_deposit(&trade_id).await?;

        let failed = seller
            .manager
            .fail_trade(&trade_id, "Deposit tx never confirmed")
            .await?;
        assert_eq!(failed.state(), TradeState::SellerSentDepositTxPublishedMsg);

        assert!(seller.manager.open_trades().is_empty());
        assert!(seller.manager.trade_access(&trade_id).await.is_err());
        assert!(seller.manager.publish_deposit(&trade_id).await.is_err());

        let failed_trades_manager = seller.manager.failed_trades_manager();
        let registered = failed_trades_manager.get_trade_by_id(&trade_id).unwrap();
        assert!(registered
            .error_message()
            .unwrap()
            .contains("Deposit tx never confirmed"));
        assert!(failed_trades_manager.was_my_offer(&registered));
        assert_eq!(
            seller.manager.get_trade_by_id(&trade_id).await,
            Some(registered)
        );

        // Same id can't be made again
        let offer = SomeTestParams::seller_offer_with_id(&trade_id);
        assert!(seller.manager.make_trade(offer).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_open_trade_resumes_after_restart() -> anyhow::Result<()> {
        logger::setup();
        let (mut seller, mut buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;
        seller.manager.publish_deposit(&trade_id).await?;
        buyer.deliver_next().await?;

        let buyer_before = buyer.manager.get_trade_by_id(&trade_id).await.unwrap();
        let mut buyer = buyer.restart().await;
        let buyer_after = buyer.manager.get_trade_by_id(&trade_id).await.unwrap();
        assert_eq!(buyer_after, buyer_before);
        assert_eq!(
            buyer_after.state(),
            TradeState::BuyerReceivedDepositTxPublishedMsg
        );

        buyer
            .manager
            .confirm_fiat_payment_started(&trade_id)
            .await?;
        assert_eq!(
            buyer.manager.get_trade_by_id(&trade_id).await.unwrap().state(),
            TradeState::BuyerSentFiatPaymentInitiatedMsg
        );

        seller.deliver_next().await?;
        assert_eq!(
            seller.manager.get_trade_by_id(&trade_id).await.unwrap().state(),
            TradeState::SellerReceivedFiatPaymentInitiatedMsg
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_message_for_unknown_trade_is_rejected() -> anyhow::Result<()> {
        logger::setup();
        let (seller, buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;

        let message = DepositTxPublishedMessage {
            trade_id: Uuid::new_v4().to_string(),
            deposit_tx_id: "deposit-unknown".to_string(),
            lock_time_block_height: SomeTestParams::LOCK_TIME_BLOCK_HEIGHT,
            sender_node_address: seller.node_address.clone(),
        };
        assert!(buyer
            .manager
            .handle_mailbox_message(Box::new(message))
            .await
            .is_err());

        let trade = buyer.manager.get_trade_by_id(&trade_id).await.unwrap();
        assert_eq!(trade.state(), TradeState::Preparation);
        Ok(())
    }

    #[tokio::test]
    async fn test_message_from_stranger_is_rejected() -> anyhow::Result<()> {
        logger::setup();
        let (seller, buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;

        let message = DepositTxPublishedMessage {
            trade_id: trade_id.clone(),
            deposit_tx_id: format!("deposit-{}", trade_id),
            lock_time_block_height: SomeTestParams::LOCK_TIME_BLOCK_HEIGHT,
            sender_node_address: SomeTestParams::arbitrator_node_address(),
        };
        let error = buyer
            .manager
            .handle_mailbox_message(Box::new(message))
            .await
            .unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::Protocol);

        let trade = buyer.manager.get_trade_by_id(&trade_id).await.unwrap();
        assert_eq!(trade.state(), TradeState::Preparation);
        assert!(trade.context().deposit_tx.get().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_intercept_hook_halts_chain() -> anyhow::Result<()> {
        logger::setup();
        let hook: InterceptHook = Arc::new(|task_name: &str, _trade: &Trade| {
            if task_name == "SendFinalizePayoutTxRequest" {
                Err("Simulated crash before release".to_string())
            } else {
                Ok(())
            }
        });
        let (mut seller, mut buyer) = TestNode::pair_with_hooks(Some(hook), None).await;
        let trade_id = open_trade(&seller, &buyer).await?;

        seller.manager.publish_deposit(&trade_id).await?;
        buyer.deliver_next().await?;
        buyer
            .manager
            .confirm_fiat_payment_started(&trade_id)
            .await?;
        seller.deliver_next().await?;

        let error = seller
            .manager
            .confirm_fiat_payment_received(&trade_id)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::UnexpectedTask);

        // Signature was produced, the release was not sent
        let trade = seller.manager.get_trade_by_id(&trade_id).await.unwrap();
        assert!(trade.context().payout_tx_signature.is_set());
        assert_eq!(
            trade.state(),
            TradeState::SellerReceivedFiatPaymentInitiatedMsg
        );
        assert!(buyer.inbox_is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_replayed_message_is_accepted() -> anyhow::Result<()> {
        logger::setup();
        let (seller, mut buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;
        seller.manager.publish_deposit(&trade_id).await?;
        buyer.deliver_next().await?;
        buyer
            .manager
            .confirm_fiat_payment_started(&trade_id)
            .await?;

        // Mailbox redelivers the deposit message after the buyer moved on
        let replayed = seller.mailbox.sent_messages().remove(0);
        buyer.manager.handle_mailbox_message(replayed).await?;

        let trade = buyer.manager.get_trade_by_id(&trade_id).await.unwrap();
        assert_eq!(trade.state(), TradeState::BuyerSentFiatPaymentInitiatedMsg);
        assert_eq!(trade.error_message(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_lost_delivery_outcome_does_not_block_trade() -> anyhow::Result<()> {
        logger::setup();
        let (seller, buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;
        seller.mailbox.set_behavior(MailboxBehavior::Hold);

        let publish = seller.manager.publish_deposit(&trade_id);
        tokio::pin!(publish);
        tokio::select! {
            result = &mut publish => panic!("Publish ended without a delivery outcome {:?}", result),
            _ = async {
                while seller.mailbox.send_count() == 0 {
                    tokio::task::yield_now().await;
                }
            } => {}
        }

        let trade = timeout(ANSWER_TIMEOUT, seller.manager.get_trade_by_id(&trade_id))
            .await?
            .unwrap();
        assert_eq!(trade.state(), TradeState::SellerPublishedDepositTx);

        let failed = timeout(
            ANSWER_TIMEOUT,
            seller.manager.fail_trade(&trade_id, "Deposit message outcome lost"),
        )
        .await??;
        assert_eq!(failed.state(), TradeState::SellerPublishedDepositTx);
        assert!(publish.await.is_err());
        assert!(seller.manager.open_trades().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_trade_in_open_and_failed_stores_resumes_as_failed() -> anyhow::Result<()> {
        logger::setup();
        let (seller, buyer) = TestNode::pair().await;
        let trade_id = open_trade(&seller, &buyer).await?;
        seller.manager.publish_deposit(&trade_id).await?;
        let failed = seller
            .manager
            .fail_trade(&trade_id, "Deposit tx never confirmed")
            .await?;
        assert!(seller.manager.open_trades().is_empty());

        // Stopped after the failed store was written but before the open store was
        let seller = seller
            .restart_after(|data_dir| {
                let open_trades = TradableList::open(data_dir, TradeCategory::Open).unwrap();
                assert!(open_trades.add(failed.clone()));
                open_trades.terminate();
            })
            .await;

        assert!(seller.manager.open_trades().is_empty());
        assert!(seller.manager.trade_access(&trade_id).await.is_err());
        assert_eq!(
            seller.manager.failed_trades_manager().get_trade_by_id(&trade_id),
            Some(failed)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_request_channel_size_is_rejected() {
        logger::setup();
        let mut config = TradeManagerConfig::new(SomeTestParams::temp_data_dir());
        config.trade_request_channel_size(0);

        let result = TradeManager::new(
            config,
            SomeTestParams::seller_key_ring(),
            SomeTestParams::seller_node_address(),
            Arc::new(TestWallet::new("seller")),
            Arc::new(TestMailbox::arriving()),
        )
        .await;
        assert!(matches!(result, Err(TradeError::Validation(_))));
    }
}
