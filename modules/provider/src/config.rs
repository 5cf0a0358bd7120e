use std::env;

/// Provider service configuration, assembled from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub http: Http,
    pub database: Database,
    pub kafka: Kafka,
    pub psp: Psp,
}

#[derive(Debug, Clone)]
pub struct Http {
    pub addr: String,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Kafka {
    pub brokers: String,
    pub client_id: String,
    pub group_id: String,
    pub payment_created_topic: String,
    pub payments_processed_topic: String,
    pub payments_failed_topic: String,
    pub partitions: i32,
}

#[derive(Debug, Clone)]
pub struct Psp {
    pub chance: f64,
    pub prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let partitions: i32 = getenv("KAFKA_PARTITIONS", "1")
            .parse()
            .map_err(|_| "KAFKA_PARTITIONS must be a valid i32".to_string())?;

        let chance: f64 = getenv("PSP_CHANCE", "0.8")
            .parse()
            .map_err(|_| "PSP_CHANCE must be a valid f64".to_string())?;
        if !(0.0..=1.0).contains(&chance) {
            return Err("PSP_CHANCE must be between 0 and 1".to_string());
        }

        Ok(Config {
            http: Http {
                addr: getenv("HTTP_ADDR", "0.0.0.0:7082"),
            },
            database: Database { url: database_url },
            kafka: Kafka {
                brokers: getenv("KAFKA_BROKERS", "localhost:9092"),
                client_id: getenv("KAFKA_CLIENT_ID", "provider"),
                group_id: getenv("KAFKA_GROUP_ID", "provider"),
                payment_created_topic: getenv("KAFKA_PAYMENT_CREATED_TOPIC", "payment.created"),
                payments_processed_topic: getenv("KAFKA_PAYMENTS_PROCESSED_TOPIC", "payments.processed"),
                payments_failed_topic: getenv("KAFKA_PAYMENTS_FAILED_TOPIC", "payments.failed"),
                partitions,
            },
            psp: Psp {
                chance,
                prefix: getenv("PSP_PREFIX", "psp_"),
            },
        })
    }
}

fn getenv(key: &str, fallback: &str) -> String {
    env::var(key).unwrap_or_else(|_| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getenv_falls_back_when_unset() {
        assert_eq!(getenv("PROVIDER_RS_DEFINITELY_UNSET_KEY", "fallback"), "fallback");
    }
}
