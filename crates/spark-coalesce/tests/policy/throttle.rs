pub mod throttle {
    //! 节流策略测试。
    //!
    //! # 测试目标（Why）
    //! - 首次调用立即执行，之后相邻两次执行至少间隔 `delay`；
    //! - 间隔内的调用只归并参数，不重新布防；
    //! - `max_calls`、`flush` 与取消的语义与防抖一致。

    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::ready;
    use spark_coalesce::{CancelReason, Rejection, ThrottleOptions, throttle};
    use tokio::time::{Instant, sleep};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    type Fired = Arc<Mutex<Vec<(u32, Duration)>>>;

    fn fired_snapshot(fired: &Fired) -> Vec<(u32, Duration)> {
        fired.lock().expect("fired lock").clone()
    }

    #[tokio::test(start_paused = true)]
    pub async fn executions_are_spaced_by_delay() {
        let fired: Fired = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        let recorder = Arc::clone(&fired);
        let throttled = throttle(
            move |n: u32| {
                recorder
                    .lock()
                    .expect("fired lock")
                    .push((n, start.elapsed()));
                ready(Ok::<_, &'static str>(n))
            },
            ms(50),
            ThrottleOptions::new(),
        );

        assert_eq!(throttled.call(0).await, Ok(0), "首次调用立即执行");
        assert!(fired_snapshot(&fired)[0].1 < ms(1));

        sleep(ms(1)).await;
        let second = throttled.call(1);
        sleep(ms(20)).await;
        let merged = throttled.call(2);
        sleep(ms(20)).await;
        assert_eq!(fired_snapshot(&fired).len(), 1, "间隔未满不得执行");
        assert_eq!(second.await, Ok(2), "间隔内的调用合并为一次，参数为最后一次调用");
        assert_eq!(merged.await, Ok(2));

        sleep(ms(1)).await;
        let third = throttled.call(3);
        assert_eq!(third.await, Ok(3));

        let fired = fired_snapshot(&fired);
        assert_eq!(
            fired.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![0, 2, 3]
        );
        for pair in fired.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(
                gap >= ms(50) && gap < ms(52),
                "相邻执行间隔应为 delay，实际 {gap:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    pub async fn idle_throttle_runs_next_call_immediately() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        let throttled = throttle(
            move |n: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                ready(Ok::<_, &'static str>(n))
            },
            ms(50),
            ThrottleOptions::new(),
        );

        assert_eq!(throttled.call(1).await, Ok(1));
        sleep(ms(100)).await;
        let start = Instant::now();
        assert_eq!(throttled.call(2).await, Ok(2));
        assert!(start.elapsed() < ms(1), "空闲超过 delay 后调用应立即执行");
        assert_eq!(invoked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    pub async fn max_calls_flushes_synchronously() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        let throttled = throttle(
            move |count: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                ready(Ok::<_, &'static str>(count))
            },
            ms(50),
            ThrottleOptions::with_reducer(|count: Option<u32>, _: ()| count.map_or(1, |n| n + 1))
                .with_max_calls(NonZeroUsize::new(5).expect("5 非零")),
        );

        let first = throttled.call(());
        for _ in 0..19 {
            let _ = throttled.call(());
        }
        assert_eq!(invoked.load(Ordering::SeqCst), 4);

        let start = Instant::now();
        let last = throttled.call(());
        assert_eq!(first.await, Ok(5));
        assert_eq!(last.await, Ok(1));
        assert!(start.elapsed() >= ms(50), "冲刷之后的调用仍需等待完整间隔");
        assert_eq!(invoked.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    pub async fn flush_invokes_target_in_caller() {
        let invoked = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&invoked);
        let throttled = throttle(
            move |n: u32| {
                recorder.lock().expect("invoked lock").push(n);
                ready(Ok::<_, &'static str>(n))
            },
            ms(50),
            ThrottleOptions::new(),
        );

        let pending = throttled.call(1);
        let _ = throttled.call(2);
        throttled.flush();
        assert_eq!(*invoked.lock().expect("invoked lock"), vec![2]);
        assert_eq!(pending.await, Ok(2));

        sleep(ms(10)).await;
        assert_eq!(
            invoked.lock().expect("invoked lock").len(),
            1,
            "冲刷会撤销已布防的定时器"
        );
    }

    #[tokio::test(start_paused = true)]
    pub async fn cancel_rejects_pending_batch() {
        let invoked = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invoked);
        let cancelled = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&cancelled);
        let throttled = throttle(
            move |n: u32| {
                counter.fetch_add(1, Ordering::SeqCst);
                ready(Ok::<_, &'static str>(n))
            },
            ms(50),
            ThrottleOptions::new().with_on_cancel(move || {
                hook.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let pending = throttled.call(1);
        throttled.cancel(Some(CancelReason::from("shutdown")));
        assert_eq!(pending.await, Err(Rejection::cancelled("shutdown".into())));

        sleep(ms(100)).await;
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        assert!(!throttled.is_pending());
    }
}
