// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWrite;

use super::{ConnectionError, ServiceContext};
use crate::{Application, Body, Continuation, LivenessState, PeerAddr, Protocol,
            ProtocolRequest, RequestEnv, RequestHooks, Response, WorkerState};

/// Runs one request against the [`Application`].
///
/// For each request, in order:
/// 1. the `pre_request` hook runs; an error fails the request,
/// 2. the request is counted; the request that reaches `max_requests` turns into the
///    last one this worker serves (the worker is marked not alive, and the [lifecycle
///    controller] is woken up). Any response produced while the worker is not alive is
///    force closed,
/// 3. the application is called and its body is streamed to the connection,
/// 4. the `post_request` hook runs, on every path including cancellation.
///
/// [lifecycle controller]: crate::WorkerLifecycle
pub struct RequestDispatcher<P, A, K> {
    ctx: Arc<ServiceContext<P, A, K>>,
}

impl<P, A, K> Clone for RequestDispatcher<P, A, K> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<P, A, K> std::fmt::Debug for RequestDispatcher<P, A, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher").finish_non_exhaustive()
    }
}

impl<P, A, K> RequestDispatcher<P, A, K>
where
    P: Protocol,
    A: Application<P::Request>,
    K: RequestHooks<P::Request>,
{
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext<P, A, K>>) -> Self { Self { ctx } }

    /// Returns [`Continuation::Stop`] when the connection must close after this
    /// response: the request asked for it, the worker is no longer alive, or the
    /// application chose to close without a response.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError`] if a hook, the application, or the transport fails.
    /// The caller closes the connection; the worker keeps serving.
    pub async fn dispatch<W>(
        &self,
        request: &P::Request,
        writer: &mut W,
        peer_addr: &PeerAddr,
    ) -> Result<Continuation, ConnectionError>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let ctx = &*self.ctx;

        // Armed before the pre_request hook so that it also covers a task that is
        // cancelled mid-request.
        let _post_request = PostRequestGuard {
            hooks: &ctx.hooks,
            worker: &ctx.state,
            request,
        };

        ctx.hooks
            .pre_request(&ctx.state, request)
            .map_err(ConnectionError::PreRequestHook)?;

        let mut response = Response::new(request.should_close());

        let tally = ctx.state.record_request();
        if tally.autorestart_triggered {
            tracing::info!(
                requests_served = tally.served,
                "Autorestarting worker after current request"
            );
            ctx.wakeup.signal();
        }

        let env = RequestEnv {
            request,
            peer_addr,
            worker: &ctx.state,
            debug: ctx.config.debug,
        };

        let body = match ctx.app.call(env, response.head_mut()).await {
            Ok(body) => body,
            Err(report) => {
                return Err(ConnectionError::Application {
                    report,
                    headers_sent: response.headers_sent(),
                });
            }
        };

        let Body::Stream(mut body) = body else {
            return Ok(Continuation::Stop);
        };

        // Checked right before the head is written, so a worker that stopped while the
        // application was running still closes this connection.
        if ctx.state.is_alive() == LivenessState::NotAlive {
            response.force_close();
        }

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => response.write(&ctx.protocol, writer, &chunk).await?,
                Err(report) => {
                    return Err(ConnectionError::Application {
                        report,
                        headers_sent: response.headers_sent(),
                    });
                }
            }
        }

        // Exhausted. Release whatever the body holds before the next request is read.
        drop(body);

        response.finish(&ctx.protocol, writer).await?;

        tracing::debug!(
            status = response.head().status,
            body_bytes = response.body_bytes(),
            served = tally.served,
            "Response sent"
        );

        if response.should_close() {
            Ok(Continuation::Stop)
        } else {
            Ok(Continuation::Continue)
        }
    }
}

/// [RAII] guard that runs the `post_request` hook when a dispatch ends, however it ends.
/// Hook errors are logged and dropped so they never replace the request's own outcome.
///
/// [RAII]: https://en.wikipedia.org/wiki/Resource_acquisition_is_initialization
struct PostRequestGuard<'a, K: RequestHooks<Req>, Req> {
    hooks: &'a K,
    worker: &'a WorkerState,
    request: &'a Req,
}

impl<K: RequestHooks<Req>, Req> Drop for PostRequestGuard<'_, K, Req> {
    fn drop(&mut self) {
        if let Err(report) = self.hooks.post_request(self.worker, self.request) {
            tracing::debug!(error = ?report, "Ignoring post_request hook error");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex,
                    atomic::{AtomicUsize, Ordering}};

    use pretty_assertions::assert_eq;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::{LineProtocol, LineRequest, ResponseHead, WakeupChannel, WakeupOutcome,
                WorkerConfig};

    #[derive(Debug, Default)]
    struct CountingHooks {
        pre: AtomicUsize,
        post: AtomicUsize,
        fail_pre: bool,
    }

    impl RequestHooks<LineRequest> for CountingHooks {
        fn pre_request(&self, _: &WorkerState, _: &LineRequest) -> miette::Result<()> {
            self.pre.fetch_add(1, Ordering::SeqCst);
            if self.fail_pre {
                miette::bail!("pre_request denied");
            }
            Ok(())
        }

        fn post_request(&self, _: &WorkerState, _: &LineRequest) -> miette::Result<()> {
            self.post.fetch_add(1, Ordering::SeqCst);
            miette::bail!("post_request errors are swallowed")
        }
    }

    /// Echoes the line, fails on `fail`, fails mid body on `fail-late`, closes without a
    /// response on `handled`, and never returns on `stall`.
    #[derive(Debug, Default)]
    struct TestApp {
        seen: Mutex<Vec<String>>,
    }

    impl Application<LineRequest> for TestApp {
        async fn call(
            &self,
            env: RequestEnv<'_, LineRequest>,
            start_response: &mut ResponseHead,
        ) -> miette::Result<Body> {
            let line = env.request.line.clone();
            self.seen.lock().unwrap().push(line.clone());
            match line.as_str() {
                "fail" => miette::bail!("application exploded"),
                "fail-late" => Ok(Body::from_stream(futures_util::stream::iter(vec![
                    Ok(b"partial".to_vec()),
                    Err(miette::miette!("body exploded")),
                ]))),
                "handled" => Ok(Body::AlreadyHandled),
                "stall" => {
                    tokio::time::sleep(std::time::Duration::from_secs(3_600)).await;
                    Ok(Body::empty())
                }
                _ => {
                    start_response.header("x-count", env.worker.requests_served().to_string());
                    Ok(Body::from_chunks([line]))
                }
            }
        }
    }

    fn create_dispatcher(
        max_requests: u64,
        hooks: CountingHooks,
    ) -> RequestDispatcher<LineProtocol, TestApp, CountingHooks> {
        let config = WorkerConfig::default().with_max_requests(max_requests);
        RequestDispatcher::new(Arc::new(ServiceContext {
            state: Arc::new(WorkerState::new(config.max_requests, 1)),
            config,
            wakeup: WakeupChannel::new(),
            protocol: LineProtocol,
            app: TestApp::default(),
            hooks,
        }))
    }

    async fn dispatch_line(
        dispatcher: &RequestDispatcher<LineProtocol, TestApp, CountingHooks>,
        line: &str,
    ) -> (Result<Continuation, ConnectionError>, String) {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let request = LineRequest::parse(line);
        let result = dispatcher
            .dispatch(&request, &mut server, &PeerAddr::Unknown)
            .await;
        drop(server);
        let mut written = String::new();
        client.read_to_string(&mut written).await.unwrap();
        (result, written)
    }

    #[tokio::test]
    async fn test_max_requests_forces_close_on_last_response() {
        let dispatcher = create_dispatcher(3, CountingHooks::default());

        let (first, first_out) = dispatch_line(&dispatcher, "one").await;
        let (second, second_out) = dispatch_line(&dispatcher, "two").await;
        assert_eq!(first.unwrap(), Continuation::Continue);
        assert_eq!(second.unwrap(), Continuation::Continue);
        assert!(first_out.contains("connection: keep-alive"));
        assert!(second_out.contains("connection: keep-alive"));
        assert_eq!(dispatcher.ctx.state.is_alive(), LivenessState::Alive);

        let (third, third_out) = dispatch_line(&dispatcher, "three").await;
        assert_eq!(third.unwrap(), Continuation::Stop);
        assert!(third_out.contains("connection: close"));
        assert!(third_out.ends_with("three"));
        assert_eq!(dispatcher.ctx.state.is_alive(), LivenessState::NotAlive);
        assert_eq!(dispatcher.ctx.state.requests_served(), 3);

        // The controller was woken up.
        assert_eq!(
            dispatcher.ctx.wakeup.wait(std::time::Duration::from_secs(5)).await,
            WakeupOutcome::Signaled
        );
    }

    #[tokio::test]
    async fn test_request_close_token_stops_iteration() {
        let dispatcher = create_dispatcher(0, CountingHooks::default());
        let (result, out) = dispatch_line(&dispatcher, "bye close").await;
        assert_eq!(result.unwrap(), Continuation::Stop);
        assert_eq!(out, "200 OK\r\nx-count: 1\r\nconnection: close\r\n\r\nbye");
    }

    #[tokio::test]
    async fn test_application_error_is_counted_and_reported() {
        let dispatcher = create_dispatcher(0, CountingHooks::default());
        let (result, out) = dispatch_line(&dispatcher, "fail").await;

        let error = result.unwrap_err();
        assert!(matches!(
            error,
            ConnectionError::Application {
                headers_sent: false,
                ..
            }
        ));
        assert!(error.should_attempt_error_response());
        assert!(out.is_empty());
        assert_eq!(dispatcher.ctx.state.requests_served(), 1);
        assert_eq!(dispatcher.ctx.hooks.post.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_body_error_after_head_sent_skips_error_response() {
        let dispatcher = create_dispatcher(0, CountingHooks::default());
        let (result, out) = dispatch_line(&dispatcher, "fail-late").await;

        let error = result.unwrap_err();
        assert!(!error.should_attempt_error_response());
        assert!(out.ends_with("partial"));
    }

    #[tokio::test]
    async fn test_already_handled_closes_without_writing() {
        let dispatcher = create_dispatcher(0, CountingHooks::default());
        let (result, out) = dispatch_line(&dispatcher, "handled").await;
        assert_eq!(result.unwrap(), Continuation::Stop);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_pre_request_failure_skips_app_and_count() {
        let dispatcher = create_dispatcher(
            0,
            CountingHooks {
                fail_pre: true,
                ..Default::default()
            },
        );
        let (result, _) = dispatch_line(&dispatcher, "hello").await;

        assert!(matches!(result, Err(ConnectionError::PreRequestHook(_))));
        assert_eq!(dispatcher.ctx.state.requests_served(), 0);
        assert!(dispatcher.ctx.app.seen.lock().unwrap().is_empty());
        assert_eq!(dispatcher.ctx.hooks.post.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_post_request_runs_once_per_dispatch() {
        let dispatcher = create_dispatcher(0, CountingHooks::default());
        for line in ["a", "fail", "handled", "fail-late", "b close"] {
            let _unused = dispatch_line(&dispatcher, line).await;
        }
        assert_eq!(dispatcher.ctx.hooks.pre.load(Ordering::SeqCst), 5);
        assert_eq!(dispatcher.ctx.hooks.post.load(Ordering::SeqCst), 5);
        assert_eq!(dispatcher.ctx.state.requests_served(), 5);
    }

    #[tokio::test]
    async fn test_response_is_force_closed_once_worker_is_not_alive() {
        let dispatcher = create_dispatcher(0, CountingHooks::default());
        dispatcher.ctx.state.mark_not_alive();

        let (result, out) = dispatch_line(&dispatcher, "late").await;

        assert_eq!(result.unwrap(), Continuation::Stop);
        assert!(out.contains("connection: close"));
        assert!(!out.contains("keep-alive"));
    }

    #[tokio::test]
    async fn test_post_request_runs_when_dispatch_is_cancelled() {
        let dispatcher = create_dispatcher(0, CountingHooks::default());

        let task = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move {
                let (_client, mut server) = tokio::io::duplex(4096);
                let request = LineRequest::parse("stall");
                let _unused = dispatcher
                    .dispatch(&request, &mut server, &PeerAddr::Unknown)
                    .await;
            }
        });

        // Wait until the application is running.
        for _ in 0..200 {
            if !dispatcher.ctx.app.seen.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(dispatcher.ctx.hooks.post.load(Ordering::SeqCst), 0);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert_eq!(dispatcher.ctx.hooks.pre.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.ctx.hooks.post.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.ctx.state.requests_served(), 1);
    }
}
