use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::codec;
use crate::config::ServerConfig;
use crate::error::{ChartError, ChartResult};
use crate::record::{Reply, Request};

/// Resolves one request into one reply. Returning `Reply::End` closes the
/// session.
pub trait RequestHandler: Send {
    type Error: fmt::Display;

    fn handle(
        &mut self,
        request: Request,
    ) -> impl Future<Output = Result<Reply, Self::Error>> + Send;
}

impl<F, Fut, E> RequestHandler for F
where
    F: FnMut(Request) -> Fut + Send,
    Fut: Future<Output = Result<Reply, E>> + Send,
    E: fmt::Display,
{
    type Error = E;

    fn handle(
        &mut self,
        request: Request,
    ) -> impl Future<Output = Result<Reply, Self::Error>> + Send {
        (self)(request)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    AwaitingRequest,
    Handling,
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServeOutcome {
    /// The handler ended the stream and the terminator was sent.
    Terminated,
    /// Shut down from outside; no reply was owed.
    Cancelled,
}

/// Single-client request/reply server.
pub struct ReplyServer<H> {
    listener: TcpListener,
    handler: H,
    state: watch::Sender<ServerState>,
}

impl<H: RequestHandler> ReplyServer<H> {
    pub async fn bind(config: &ServerConfig, handler: H) -> ChartResult<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        debug!("reply server listening on {}", listener.local_addr()?);
        let (state, _) = watch::channel(ServerState::Idle);
        Ok(ReplyServer {
            listener,
            handler,
            state,
        })
    }

    pub fn local_addr(&self) -> ChartResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Accepts one client and answers its requests until the handler ends
    /// the stream, `cancel` fires, or the transport fails.
    ///
    /// Cancellation while a request is being handled drops the connection
    /// without a reply, which the client observes as a closed connection.
    pub async fn serve(self, cancel: CancellationToken) -> ChartResult<ServeOutcome> {
        let ReplyServer {
            listener,
            mut handler,
            state,
        } = self;
        let session = Uuid::new_v4();

        let result = run_session(session, listener, &mut handler, &state, &cancel).await;
        state.send_replace(ServerState::Terminated);

        match &result {
            Ok(ServeOutcome::Terminated) => info!("session {} terminated", session),
            Ok(ServeOutcome::Cancelled) => info!("session {} cancelled", session),
            Err(err) => warn!("session {} failed: {}", session, err),
        }
        result
    }
}

async fn run_session<H: RequestHandler>(
    session: Uuid,
    listener: TcpListener,
    handler: &mut H,
    state: &watch::Sender<ServerState>,
    cancel: &CancellationToken,
) -> ChartResult<ServeOutcome> {
    let (stream, peer) = select! {
        biased;
        _ = cancel.cancelled() => return Ok(ServeOutcome::Cancelled),
        accepted = listener.accept() => accepted?,
    };
    // One client per server.
    drop(listener);
    info!("session {} opened by {}", session, peer);
    let mut transport = codec::framed(stream)?;

    let mut served = 0u64;
    loop {
        state.send_replace(ServerState::AwaitingRequest);
        let request = select! {
            biased;
            _ = cancel.cancelled() => return Ok(ServeOutcome::Cancelled),
            frame = codec::recv::<Request>(&mut transport) => match frame? {
                Some(request) => request,
                None => return Err(ChartError::ConnectionClosed),
            },
        };

        state.send_replace(ServerState::Handling);
        debug!("session {} request for index {}", session, request.index);
        let reply = select! {
            biased;
            _ = cancel.cancelled() => return Ok(ServeOutcome::Cancelled),
            reply = handler.handle(request) => {
                reply.map_err(|err| ChartError::Handler(err.to_string()))?
            }
        };

        codec::send(&mut transport, &reply).await?;
        if reply.is_end() {
            debug!("session {} ended after {} records", session, served);
            return Ok(ServeOutcome::Terminated);
        }
        served += 1;
    }
}

