//! Device pool resolution.
//!
//! A run is always scheduled against a pool. Callers may name a pool directly
//! or name a single device, in which case a private one-device pool is created
//! on the fly.

use std::fmt;

use tracing::info;

use crate::farm::{CreateDevicePool, Device, DeviceFarm, DevicePool, FarmError, PoolRule};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device '{key}' is ambiguous, it matches {matches} devices: {arns}")]
    AmbiguousDevice {
        key: String,
        matches: usize,
        arns: String,
    },

    #[error("Either a device or a device pool is required")]
    MissingDeviceOrPool,

    #[error(transparent)]
    Farm(#[from] FarmError),
}

/// The `"<name> - <os>"` string users pick devices by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceKey(String);

impl DeviceKey {
    pub fn of(device: &Device) -> Self {
        DeviceKey(format!("{} - {}", device.name, device.os))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Finds the single device whose key or ARN equals `wanted`.
pub fn find_device<'a>(devices: &'a [Device], wanted: &str) -> Result<&'a Device, PoolError> {
    let matches: Vec<&Device> = devices
        .iter()
        .filter(|d| d.arn == wanted || DeviceKey::of(d).as_str() == wanted)
        .collect();

    match matches.as_slice() {
        [device] => Ok(device),
        [] => Err(PoolError::DeviceNotFound(wanted.to_string())),
        many => Err(PoolError::AmbiguousDevice {
            key: wanted.to_string(),
            matches: many.len(),
            arns: many
                .iter()
                .map(|d| d.arn.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// `ARN IN ["<device arn>"]`
pub fn single_device_rule(device_arn: &str) -> PoolRule {
    PoolRule {
        attribute: "ARN".to_string(),
        operator: "IN".to_string(),
        value: serde_json::Value::from(vec![device_arn]).to_string(),
    }
}

/// Creates a private pool holding exactly the device identified by `device`.
///
/// The pool name defaults to the device identifier as given.
pub async fn create_pool_from_device(
    farm: &dyn DeviceFarm,
    project_arn: &str,
    device: &str,
    name: Option<&str>,
) -> Result<DevicePool, PoolError> {
    let devices = farm.list_devices().await?;
    let found = find_device(&devices, device)?;

    let name = name.unwrap_or(device).to_string();
    let request = CreateDevicePool {
        project_arn: project_arn.to_string(),
        description: format!("autocreated pool {}", name),
        name,
        rules: vec![single_device_rule(&found.arn)],
    };
    let pool = farm.create_device_pool(&request).await?;
    info!("Created device pool {} for {}", pool.arn, DeviceKey::of(found));
    Ok(pool)
}

/// Returns the pool ARN to schedule against.
///
/// An explicit pool wins and is used verbatim; otherwise a pool is created
/// from `device`.
pub async fn resolve_device_pool(
    farm: &dyn DeviceFarm,
    project_arn: &str,
    explicit_pool: Option<&str>,
    device: Option<&str>,
) -> Result<String, PoolError> {
    match (explicit_pool, device) {
        (Some(pool), _) => Ok(pool.to_string()),
        (None, Some(device)) => {
            let pool = create_pool_from_device(farm, project_arn, device, None).await?;
            Ok(pool.arn)
        }
        (None, None) => Err(PoolError::MissingDeviceOrPool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::farm::fake::FakeDeviceFarm;

    fn device(arn: &str, name: &str, os: &str) -> Device {
        Device {
            arn: arn.to_string(),
            name: name.to_string(),
            os: os.to_string(),
            model: name.to_string(),
            platform: "ANDROID".to_string(),
            form_factor: "PHONE".to_string(),
            manufacturer: "Google".to_string(),
        }
    }

    fn catalog() -> Vec<Device> {
        vec![
            device("arn:device:p5-11", "Pixel 5", "11"),
            device("arn:device:p5-12", "Pixel 5", "12"),
            device("arn:device:s21-a", "Galaxy S21", "12"),
            device("arn:device:s21-b", "Galaxy S21", "12"),
        ]
    }

    #[test]
    fn test_find_device_by_key() {
        let devices = catalog();
        let found = find_device(&devices, "Pixel 5 - 11").unwrap();
        assert_eq!(found.arn, "arn:device:p5-11");
    }

    #[test]
    fn test_find_device_by_arn() {
        let devices = catalog();
        let found = find_device(&devices, "arn:device:s21-b").unwrap();
        assert_eq!(found.arn, "arn:device:s21-b");
    }

    #[test]
    fn test_find_device_requires_exact_key() {
        let devices = catalog();
        assert!(matches!(
            find_device(&devices, "Pixel 5"),
            Err(PoolError::DeviceNotFound(_))
        ));
        assert!(matches!(
            find_device(&devices, "pixel 5 - 11"),
            Err(PoolError::DeviceNotFound(_))
        ));
    }

    #[test]
    fn test_find_device_ambiguous() {
        let devices = catalog();
        match find_device(&devices, "Galaxy S21 - 12") {
            Err(PoolError::AmbiguousDevice { matches, arns, .. }) => {
                assert_eq!(matches, 2);
                assert!(arns.contains("arn:device:s21-a"));
                assert!(arns.contains("arn:device:s21-b"));
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn test_single_device_rule_is_json_array() {
        let rule = single_device_rule("arn:aws:devicefarm:us-west-2::device:ABC");
        assert_eq!(rule.attribute, "ARN");
        assert_eq!(rule.operator, "IN");

        let parsed: Vec<String> = serde_json::from_str(&rule.value).unwrap();
        assert_eq!(parsed, vec!["arn:aws:devicefarm:us-west-2::device:ABC"]);
    }

    #[tokio::test]
    async fn test_explicit_pool_used_verbatim() {
        let farm = FakeDeviceFarm::new();
        let arn = resolve_device_pool(&farm, "arn:project", Some("arn:pool:x"), Some("ignored"))
            .await
            .unwrap();

        assert_eq!(arn, "arn:pool:x");
        assert!(farm.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_pool_created_from_device() {
        let farm = FakeDeviceFarm::new();
        for d in catalog() {
            farm.add_device(d).await;
        }

        let arn = resolve_device_pool(&farm, "arn:project", None, Some("Pixel 5 - 11"))
            .await
            .unwrap();

        let created = farm.created_pools().await;
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Pixel 5 - 11");
        assert_eq!(created[0].description, "autocreated pool Pixel 5 - 11");
        assert_eq!(created[0].rules, vec![single_device_rule("arn:device:p5-11")]);
        assert!(arn.contains(":devicepool:"));
    }

    #[tokio::test]
    async fn test_named_pool_from_device() {
        let farm = FakeDeviceFarm::new();
        for d in catalog() {
            farm.add_device(d).await;
        }

        let pool = create_pool_from_device(&farm, "arn:project", "Pixel 5 - 12", Some("nightly"))
            .await
            .unwrap();

        assert_eq!(pool.name, "nightly");
        assert_eq!(pool.description.as_deref(), Some("autocreated pool nightly"));
    }

    #[tokio::test]
    async fn test_missing_device_and_pool() {
        let farm = FakeDeviceFarm::new();
        let err = resolve_device_pool(&farm, "arn:project", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::MissingDeviceOrPool));
    }

    #[tokio::test]
    async fn test_unknown_device_creates_nothing() {
        let farm = FakeDeviceFarm::new();
        for d in catalog() {
            farm.add_device(d).await;
        }

        let err = resolve_device_pool(&farm, "arn:project", None, Some("iPhone 15 - 17"))
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::DeviceNotFound(_)));
        assert!(farm.created_pools().await.is_empty());
    }
}
