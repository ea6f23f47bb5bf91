//! RabbitMQ implementation of the broker traits, on top of `lapin`.
//!
//! One connection, one channel. Replies are published to the default exchange
//! with `mandatory` set; together with publisher confirms this turns an
//! unknown `reply_to` queue into `BrokerError::Unroutable` instead of a
//! silent drop.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{FieldTable, ShortString};
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, info, warn};

use super::{
    BrokerChannel, BrokerClient, BrokerError, Delivery, DeliveryStream, DeliveryTag,
    MessageProperties,
};
use crate::config::BrokerSettings;

const JSON_CONTENT_TYPE: &str = "application/json";
const REPLY_SUCCESS: u16 = 200;

pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
}

/// Builds the connection URI from discrete settings so credentials never need
/// URL escaping.
pub fn amqp_uri(settings: &BrokerSettings) -> AMQPUri {
    AMQPUri {
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: settings.username.clone(),
                password: settings.password.clone(),
            },
            host: settings.host.clone(),
            port: settings.port,
        },
        vhost: settings.vhost.clone(),
        ..AMQPUri::default()
    }
}

impl AmqpBroker {
    pub async fn connect(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        let connection =
            Connection::connect_uri(amqp_uri(settings), ConnectionProperties::default())
                .await
                .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let channel = match open_channel(&connection, settings.publisher_confirms).await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection
                    .close(REPLY_SUCCESS, "channel setup failed")
                    .await
                {
                    warn!("Failed to close broker connection: {close_err}");
                }
                return Err(e);
            }
        };

        info!(
            host = %settings.host,
            port = settings.port,
            vhost = %settings.vhost,
            "Connected to broker"
        );

        Ok(Self {
            connection,
            channel,
        })
    }
}

async fn open_channel(connection: &Connection, confirms: bool) -> Result<Channel, BrokerError> {
    let channel = connection
        .create_channel()
        .await
        .map_err(|e| BrokerError::Connection(e.to_string()))?;
    if confirms {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
    }
    Ok(channel)
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        let properties = MessageProperties {
            correlation_id: delivery
                .properties
                .correlation_id()
                .as_ref()
                .map(|id| id.as_str().to_owned()),
            reply_to: delivery
                .properties
                .reply_to()
                .as_ref()
                .map(|queue| queue.as_str().to_owned()),
        };

        Delivery {
            tag: DeliveryTag::new(delivery.delivery_tag),
            payload: delivery.data,
            properties,
        }
    }
}

#[async_trait]
impl BrokerChannel for AmqpBroker {
    async fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> Result<(), BrokerError> {
        let mut basic_properties =
            BasicProperties::default().with_content_type(ShortString::from(JSON_CONTENT_TYPE));
        if let Some(correlation_id) = &properties.correlation_id {
            basic_properties =
                basic_properties.with_correlation_id(ShortString::from(correlation_id.as_str()));
        }
        if let Some(reply_to) = &properties.reply_to {
            basic_properties = basic_properties.with_reply_to(ShortString::from(reply_to.as_str()));
        }

        let confirmation = self
            .channel
            .basic_publish(
                "",
                destination,
                BasicPublishOptions {
                    mandatory: true,
                    ..BasicPublishOptions::default()
                },
                payload,
                basic_properties,
            )
            .await?
            .await?;

        match confirmation {
            Confirmation::Ack(None) | Confirmation::NotRequested => Ok(()),
            Confirmation::Ack(Some(_)) => Err(BrokerError::Unroutable {
                destination: destination.to_string(),
            }),
            Confirmation::Nack(_) => Err(BrokerError::Rejected {
                destination: destination.to_string(),
            }),
        }
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(tag.value(), BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(
                tag.value(),
                BasicNackOptions {
                    requeue,
                    ..BasicNackOptions::default()
                },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for AmqpBroker {
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError> {
        self.channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        debug!(queue = name, "Declared durable queue");
        Ok(())
    }

    async fn declare_reply_queue(&self) -> Result<String, BrokerError> {
        let queue = self
            .channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(queue.name().as_str().to_owned())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(count, BasicQosOptions::default())
            .await?;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer
            .map(|delivery| delivery.map(Delivery::from).map_err(BrokerError::from))
            .boxed())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.channel.status().connected() {
            self.channel.close(REPLY_SUCCESS, "worker shutdown").await?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "worker shutdown")
                .await
                .map_err(|e| BrokerError::Connection(e.to_string()))?;
        }
        info!("Broker connection closed");
        Ok(())
    }
}
