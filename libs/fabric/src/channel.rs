use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use crate::codec::Codec;
use crate::error::Result;
use crate::transport::{Connector, Transport};

/// High-level channel for typed publish/request traffic
///
/// Combines one broker connection and a codec. Cloning shares the connection.
#[derive(Clone)]
pub struct Channel<C> {
    transport: Arc<dyn Transport>,
    codec: C,
}

impl<C: Codec> Channel<C> {
    /// Create a channel from an existing connection
    pub fn from_transport(transport: Arc<dyn Transport>, codec: C) -> Self {
        Self { transport, codec }
    }

    /// Open a new connection through `connector`
    pub async fn connect(connector: &dyn Connector, codec: C) -> Result<Self> {
        let transport = connector.connect().await?;
        Ok(Self::from_transport(Arc::from(transport), codec))
    }

    /// The underlying connection
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encode and publish a message
    pub async fn publish<T: Serialize>(&self, subject: &str, message: &T) -> Result<()> {
        let bytes = self.codec.encode(message)?;
        self.transport.publish(subject, &bytes).await
    }

    /// Encode a request, publish it and decode the single reply
    pub async fn request<Req, Res>(
        &self,
        subject: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Res>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let bytes = self.codec.encode(request)?;
        let reply = self.transport.request(subject, &bytes, timeout).await?;
        self.codec.decode(&reply.payload)
    }

    /// Close the channel's connection
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}
