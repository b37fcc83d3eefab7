use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::channel::Channel;
use crate::codec::Codec;
use crate::error::Result;
use crate::transport::Connector;

/// Perform a one-off request/reply
///
/// Opens a connection, sends the request, waits for the reply and closes the
/// connection again, whether or not the exchange succeeded.
pub async fn request<Req, Res, C>(
    connector: &dyn Connector,
    subject: &str,
    request: &Req,
    codec: C,
    timeout: Duration,
) -> Result<Res>
where
    Req: Serialize,
    Res: DeserializeOwned,
    C: Codec,
{
    let channel = Channel::connect(connector, codec).await?;
    let response = channel.request(subject, request, timeout).await;
    if let Err(e) = channel.close().await {
        tracing::debug!(subject, error = %e, "Failed to close request connection");
    }
    response
}

/// Publish a message without waiting for a reply (fire-and-forget)
pub async fn send<T, C>(connector: &dyn Connector, subject: &str, message: &T, codec: C) -> Result<()>
where
    T: Serialize,
    C: Codec,
{
    let channel = Channel::connect(connector, codec).await?;
    let sent = channel.publish(subject, message).await;
    channel.close().await?;
    sent
}
