pub mod debounce {
    //! 防抖策略测试。
    //!
    //! # 测试目标（Why）
    //! - 验证同一安静期内的调用只执行一次，且所有调用方拿到同一结果；
    //! - 验证 `max_delay` 在持续活跃时强制执行、`max_calls` 在批量达到上限时同步冲刷；
    //! - 验证取消会拒绝全部等待者且目标函数不会被调用。

    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::{Ready, join_all, ready};
    use spark_coalesce::{CancelReason, DebounceOptions, Rejection, debounce};
    use tokio::time::{Instant, sleep};

    type Log<T> = Arc<Mutex<Vec<T>>>;

    fn log<T>() -> Log<T> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn snapshot<T: Clone>(log: &Log<T>) -> Vec<T> {
        log.lock().expect("log lock").clone()
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// 目标函数：记录收到的参数并原样返回。
    fn echo(
        calls: &Log<i64>,
    ) -> impl Fn(i64) -> Ready<Result<i64, &'static str>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |n| {
            calls.lock().expect("calls lock").push(n);
            ready(Ok(n))
        }
    }

    #[tokio::test(start_paused = true)]
    pub async fn burst_is_coalesced_into_one_invocation_with_latest_arguments() {
        let calls = log();
        let debounced = debounce(echo(&calls), ms(25), DebounceOptions::new());

        let waiters: Vec<_> = (1..=4).map(|n| debounced.call(n)).collect();
        assert!(debounced.is_pending());
        let results = join_all(waiters).await;

        assert_eq!(results, vec![Ok(4); 4], "全部调用方应拿到同一结果");
        assert_eq!(snapshot(&calls), vec![4], "安静期内只执行一次，参数为最后一次调用");
        assert!(!debounced.is_pending());
    }

    #[tokio::test(start_paused = true)]
    pub async fn reducer_accumulates_per_batch() {
        let calls = log();
        let debounced = debounce(
            echo(&calls),
            ms(25),
            DebounceOptions::with_reducer(|total: Option<i64>, n: i64| total.unwrap_or(0) + n),
        );

        let first = join_all([debounced.call(4), debounced.call(6)]).await;
        assert_eq!(first, vec![Ok(10), Ok(10)]);

        let second = join_all([debounced.call(2), debounced.call(-20), debounced.call(6)]).await;
        assert_eq!(second, vec![Ok(-12); 3], "新批次的累积值从空开始");
        assert_eq!(snapshot(&calls), vec![10, -12]);
    }

    #[tokio::test(start_paused = true)]
    pub async fn max_calls_flushes_synchronously() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        let debounced = debounce(
            move |count: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                ready(Ok::<_, &'static str>(count))
            },
            ms(50),
            DebounceOptions::with_reducer(|count: Option<u32>, _: ()| count.map_or(1, |n| n + 1))
                .with_max_calls(NonZeroUsize::new(5).expect("5 非零")),
        );

        let first = debounced.call(());
        for _ in 0..19 {
            let _ = debounced.call(());
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 4, "每满 5 次调用同步执行一次");

        let start = Instant::now();
        let last = debounced.call(());
        assert_eq!(first.await, Ok(5));
        assert_eq!(last.await, Ok(1), "剩余的单次调用在安静期后执行");
        assert!(start.elapsed() >= ms(50));
        assert_eq!(invoked.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    pub async fn flush_runs_pending_batch_immediately() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        let debounced = debounce(
            move |count: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                ready(Ok::<_, &'static str>(count))
            },
            ms(50),
            DebounceOptions::with_reducer(|count: Option<u32>, _: ()| count.map_or(1, |n| n + 1)),
        );

        let first = debounced.call(());
        debounced.flush();
        let second = debounced.call(());
        let _ = debounced.call(());
        let _ = debounced.call(());
        debounced.flush();
        let third = debounced.call(());
        let _ = debounced.call(());
        assert_eq!(invoked.load(Ordering::SeqCst), 2, "flush 同步调用目标函数");

        assert_eq!(first.await, Ok(1));
        assert_eq!(second.await, Ok(3));
        assert_eq!(third.await, Ok(2));
        assert_eq!(invoked.load(Ordering::SeqCst), 3);

        debounced.flush();
        sleep(ms(1)).await;
        assert_eq!(invoked.load(Ordering::SeqCst), 3, "无待执行批次时 flush 无副作用");
    }

    #[tokio::test(start_paused = true)]
    pub async fn max_delay_caps_waiting_under_steady_calls() {
        let calls = log();
        let debounced = debounce(
            echo(&calls),
            ms(50),
            DebounceOptions::new().with_max_delay(ms(100)),
        );

        for n in 0..4 {
            if n > 0 {
                sleep(ms(25)).await;
            }
            let _ = debounced.call(n);
        }
        // 每次调用都把触发推后，但不会超过首个调用之后 100ms。
        sleep(ms(10)).await;
        assert!(snapshot(&calls).is_empty(), "最长等待到期之前不得执行");
        sleep(ms(20)).await;
        assert_eq!(snapshot(&calls), vec![3], "首个调用后 100ms 必须执行一次");
    }

    #[tokio::test(start_paused = true)]
    pub async fn continuous_activity_fires_once_per_max_delay_window() {
        let fired_at = log();
        let start = Instant::now();
        let recorder = Arc::clone(&fired_at);
        let debounced = debounce(
            move |n: u32| {
                recorder.lock().expect("fired lock").push(start.elapsed());
                ready(Ok::<_, &'static str>(n))
            },
            ms(50),
            DebounceOptions::new().with_max_delay(ms(100)),
        );

        for n in 0..12 {
            let _ = debounced.call(n);
            sleep(ms(30)).await;
        }

        let fired = snapshot(&fired_at);
        assert_eq!(fired.len(), 3, "360ms 的持续调用应触发三次，实际 {fired:?}");
        for (fired, expected) in fired.iter().zip([100, 220, 340]) {
            assert!(
                *fired >= ms(expected) && *fired < ms(expected + 2),
                "触发时刻 {fired:?} 应约为 {expected}ms"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    pub async fn cancel_rejects_waiters_and_skips_target() {
        let calls = log();
        let cancelled = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&cancelled);
        let debounced = debounce(
            echo(&calls),
            ms(50),
            DebounceOptions::new().with_on_cancel(move || {
                hook.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let waiters = [debounced.call(1), debounced.call(2)];
        sleep(ms(25)).await;
        debounced.cancel(None);

        for waiter in waiters {
            assert_eq!(
                waiter.await,
                Err(Rejection::cancelled(CancelReason::cancelled())),
                "取消的缺省原因为 cancelled"
            );
        }
        sleep(ms(100)).await;
        assert!(snapshot(&calls).is_empty(), "取消后目标函数不得执行");
        assert_eq!(cancelled.load(Ordering::SeqCst), 1, "on_cancel 恰好执行一次");
    }

    #[tokio::test(start_paused = true)]
    pub async fn target_failure_reaches_every_waiter() {
        let debounced = debounce(
            |_: u8| ready(Err::<u8, _>("boom")),
            ms(10),
            DebounceOptions::new(),
        );
        let results = join_all([debounced.call(1), debounced.call(2)]).await;
        assert_eq!(results, vec![Err(Rejection::Failed("boom")); 2]);
    }
}
