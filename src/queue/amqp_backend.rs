//! RabbitMQ-backed queue, for deployments that already run an AMQP broker.
//!
//! Visibility timeout and retry counting are not native to AMQP basic
//! queues, so this backend layers them on top: a lease is a held (not yet
//! acked) delivery tag plus a local deadline; `reap_expired` nacks deliveries
//! past their deadline with `requeue = true` and tracks the retry count in
//! the message headers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Lease, Outcome, Queue};
use crate::error::QueueError;
use crate::model::Priority;

const QUEUE_NAME: &str = "invoice_ocr_jobs";
const RETRY_HEADER: &str = "x-retry-count";

fn priority_value(priority: Priority) -> u8 {
    match priority {
        Priority::Low => 1,
        Priority::Normal => 4,
        Priority::High => 7,
        Priority::Urgent => 9,
    }
}

struct Held {
    delivery_tag: u64,
    retry_count: u32,
    deadline: Instant,
}

pub struct AmqpQueue {
    channel: Channel,
    held: Mutex<HashMap<Uuid, Held>>,
    max_retries: u32,
}

impl AmqpQueue {
    pub async fn connect(amqp_url: &str, max_retries: u32) -> Result<Self, QueueError> {
        let conn = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::Unavailable(format!("amqp connect: {e}")))?;
        let channel = conn
            .create_channel()
            .await
            .map_err(|e| QueueError::Unavailable(format!("amqp channel: {e}")))?;
        let mut queue_args = FieldTable::default();
        queue_args.insert("x-max-priority".into(), AMQPValue::ShortShortUInt(9));
        channel
            .queue_declare(
                QUEUE_NAME,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                queue_args,
            )
            .await
            .map_err(|e| QueueError::Unavailable(format!("amqp queue_declare: {e}")))?;
        Ok(Self {
            channel,
            held: Mutex::new(HashMap::new()),
            max_retries,
        })
    }
}

#[async_trait]
impl Queue for AmqpQueue {
    async fn enqueue(
        &self,
        job_id: &str,
        payload: Vec<u8>,
        priority: Priority,
    ) -> Result<(), QueueError> {
        let mut headers = FieldTable::default();
        headers.insert(RETRY_HEADER.into(), AMQPValue::LongUInt(0));
        headers.insert("x-job-id".into(), AMQPValue::LongString(job_id.into()));

        self.channel
            .basic_publish(
                "",
                QUEUE_NAME,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_headers(headers)
                    .with_priority(priority_value(priority)),
            )
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn dequeue(
        &self,
        visibility_timeout: Duration,
    ) -> Result<Option<(Lease, Vec<u8>)>, QueueError> {
        // Reap held deliveries whose visibility window elapsed.
        {
            let mut held = self.held.lock().await;
            let now = Instant::now();
            let expired: Vec<Uuid> = held
                .iter()
                .filter(|(_, h)| h.deadline <= now)
                .map(|(id, _)| *id)
                .collect();
            for lease_id in expired {
                let entry = held.remove(&lease_id).unwrap();
                let requeue = entry.retry_count < self.max_retries;
                let _ = self
                    .channel
                    .basic_nack(
                        entry.delivery_tag,
                        BasicNackOptions {
                            requeue,
                            ..Default::default()
                        },
                    )
                    .await;
            }
        }

        let mut consumer = self
            .channel
            .basic_consume(
                QUEUE_NAME,
                "invoice-ocr-worker",
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| QueueError::Unavailable(e.to_string()))?;

        use futures::StreamExt;
        let delivery = match tokio::time::timeout(Duration::from_millis(50), consumer.next()).await
        {
            Ok(Some(Ok(delivery))) => delivery,
            _ => return Ok(None),
        };

        let retry_count = delivery
            .properties
            .headers()
            .as_ref()
            .and_then(|h| h.inner().get(RETRY_HEADER))
            .and_then(|v| match v {
                AMQPValue::LongUInt(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0);
        let job_id = delivery
            .properties
            .headers()
            .as_ref()
            .and_then(|h| h.inner().get("x-job-id"))
            .and_then(|v| match v {
                AMQPValue::LongString(s) => Some(s.to_string()),
                _ => None,
            })
            .unwrap_or_default();

        let lease_id = Uuid::new_v4();
        self.held.lock().await.insert(
            lease_id,
            Held {
                delivery_tag: delivery.delivery_tag,
                retry_count,
                deadline: Instant::now() + visibility_timeout,
            },
        );

        Ok(Some((
            Lease {
                lease_id,
                job_id,
                retry_count,
            },
            delivery.data.clone(),
        )))
    }

    async fn complete(&self, lease: &Lease, outcome: Outcome) -> Result<(), QueueError> {
        let held = self.held.lock().await.remove(&lease.lease_id);
        let held = match held {
            Some(h) => h,
            None => return Err(QueueError::LeaseExpired),
        };
        match outcome {
            Outcome::Success | Outcome::Discard => {
                self.channel
                    .basic_ack(held.delivery_tag, BasicAckOptions::default())
                    .await
                    .map_err(|e| QueueError::Unavailable(e.to_string()))?;
            }
            Outcome::Retry => {
                let requeue = held.retry_count + 1 <= self.max_retries;
                self.channel
                    .basic_nack(
                        held.delivery_tag,
                        BasicNackOptions {
                            requeue,
                            ..Default::default()
                        },
                    )
                    .await
                    .map_err(|e| QueueError::Unavailable(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
