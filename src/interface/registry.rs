//! Registry of service instances, at most one per interface id.

use std::collections::BTreeMap;

use tracing::trace;

use crate::core::{MleError, MleResult};

use super::instance::ServiceInstance;

/// All registered interfaces.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    instances: BTreeMap<i8, ServiceInstance>,
}

impl InterfaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the instance for `interface_id`, creating it with defaults.
    ///
    /// An existing instance keeps its handlers, timers and token bucket; only
    /// its MAC and challenge length are refreshed.
    pub fn get_or_create(
        &mut self,
        interface_id: i8,
        mac64: [u8; 8],
        challenge_length: u8,
    ) -> &mut ServiceInstance {
        let instance = self
            .instances
            .entry(interface_id)
            .or_insert_with(|| ServiceInstance::new(interface_id, mac64, challenge_length));
        instance.update(mac64, challenge_length);
        instance
    }

    /// Look up an instance.
    pub fn find(&self, interface_id: i8) -> Option<&ServiceInstance> {
        self.instances.get(&interface_id)
    }

    /// Look up an instance for mutation.
    pub fn find_mut(&mut self, interface_id: i8) -> Option<&mut ServiceInstance> {
        self.instances.get_mut(&interface_id)
    }

    /// Remove an instance.
    pub fn delete(&mut self, interface_id: i8) -> MleResult<ServiceInstance> {
        self.instances
            .remove(&interface_id)
            .ok_or(MleError::InterfaceNotFound(interface_id))
    }

    /// Check if no interface is registered.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of registered interfaces.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Registered instances in interface id order.
    pub fn iter(&self) -> impl Iterator<Item = &ServiceInstance> {
        self.instances.values()
    }

    /// Refill every token bucket. Returns whether any still needs ticks.
    pub fn tick(&mut self, elapsed: u16) -> bool {
        let mut active = false;
        for instance in self.instances.values_mut() {
            if instance.token_bucket.refill(elapsed) {
                active = true;
            }
        }
        trace!(elapsed, active, "interface tick");
        active
    }

    /// Check if any token bucket is below its size.
    pub fn needs_tick(&self) -> bool {
        self.instances
            .values()
            .any(|instance| instance.token_bucket.needs_refill())
    }

    /// Remove every instance.
    pub fn clear(&mut self) {
        self.instances.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DEFAULT_MRC, DEFAULT_MRT, DEFAULT_URT};

    const MAC: [u8; 8] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];

    #[test]
    fn test_get_or_create_defaults() {
        let mut registry = InterfaceRegistry::new();
        let instance = registry.get_or_create(1, MAC, 8);

        let timers = instance.timer_defaults();
        assert_eq!(timers.urt, DEFAULT_URT);
        assert_eq!(timers.mrt, DEFAULT_MRT);
        assert_eq!(timers.mrc, DEFAULT_MRC);
        assert!(!instance.token_bucket().is_limited());
        assert_eq!(
            instance.link_local(),
            "fe80::211:2233:4455:6677".parse::<std::net::Ipv6Addr>().unwrap()
        );
    }

    #[test]
    fn test_single_instance_per_id() {
        let mut registry = InterfaceRegistry::new();
        registry.get_or_create(1, MAC, 8).token_bucket.set(2, 5, 1);
        let again = registry.get_or_create(1, [1; 8], 16);

        assert_eq!(again.challenge_length(), 16);
        assert_eq!(again.token_bucket().size(), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_delete() {
        let mut registry = InterfaceRegistry::new();
        registry.get_or_create(3, MAC, 8);
        assert!(registry.delete(3).is_ok());
        assert!(registry.is_empty());
        assert!(registry.delete(3).unwrap_err().is_not_found());
    }

    #[test]
    fn test_tick_reports_refilling_buckets() {
        let mut registry = InterfaceRegistry::new();
        registry.get_or_create(1, MAC, 8);
        assert!(!registry.tick(1));

        let bucket = &mut registry.find_mut(1).unwrap().token_bucket;
        bucket.set(2, 3, 1);
        bucket.consume(false);
        assert!(registry.needs_tick());
        assert!(registry.tick(1));
        assert!(!registry.tick(2));
        assert!(!registry.needs_tick());
    }
}
