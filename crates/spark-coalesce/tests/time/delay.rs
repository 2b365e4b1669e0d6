pub mod delay {
    //! 可取消延迟测试。
    //!
    //! # 测试目标（Why）
    //! - 到期以给定值完成，生产函数只在到期时求值；
    //! - `cancel` 立即拒绝，重复取消与完成后取消同步报错；
    //! - `stop` 让延迟在下一轮调度完成，已完成或已取消时无副作用。

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use spark_coalesce::{CancelReason, SettleError, WaitValue, delay, wait, wait_with};
    use tokio::time::{Instant, sleep};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[tokio::test(start_paused = true)]
    pub async fn wait_resolves_after_delay() {
        let start = Instant::now();
        assert_eq!(wait(ms(100)).await, Ok(()));
        assert!(start.elapsed() >= ms(100));

        assert_eq!(wait_with(ms(10), WaitValue::Value("done")).await, Ok("done"));
        assert_eq!(delay(WaitValue::Value(7_u8), ms(10)).await, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    pub async fn producer_is_evaluated_only_when_fired() {
        let produced = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&produced);
        let pending = wait_with(
            ms(50),
            WaitValue::producer(move || counter.fetch_add(1, Ordering::SeqCst) + 40),
        );

        sleep(ms(20)).await;
        assert_eq!(produced.load(Ordering::SeqCst), 0, "到期前不得求值");
        assert_eq!(pending.await, Ok(40));
        assert_eq!(produced.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    pub async fn cancel_rejects_immediately_and_only_once() {
        let pending = wait_with(ms(1_000), WaitValue::Value(1_u32));
        let start = Instant::now();
        assert!(pending.cancel(Some("testing cancel".into())).is_ok());
        assert_eq!(
            pending.cancel(None),
            Err(SettleError::AlreadyCancelled),
            "重复取消必须同步报错"
        );
        pending.stop();

        let handle = pending.handle();
        assert_eq!(pending.await, Err(CancelReason::from("testing cancel")));
        assert!(start.elapsed() < ms(1), "取消应立即生效");
        assert_eq!(handle.cancel(None), Err(SettleError::AlreadyCancelled));
    }

    #[tokio::test(start_paused = true)]
    pub async fn cancel_after_completion_reports_settled() {
        let pending = wait(ms(10));
        let handle = pending.handle();
        assert_eq!(pending.await, Ok(()));
        assert_eq!(handle.cancel(None), Err(SettleError::AlreadySettled));
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    pub async fn stop_fires_on_next_tick_and_is_idempotent() {
        let start = Instant::now();
        let pending = wait_with(Duration::from_secs(3_600), WaitValue::Value("early"));
        pending.stop();
        pending.stop();
        assert_eq!(pending.await, Ok("early"));
        assert!(start.elapsed() < ms(1), "stop 后不再等待原延迟");
    }
}
