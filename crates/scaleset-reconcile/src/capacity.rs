//! Capacity-need calculation.

use scaleset_core::config::ScalingConfig;

/// Number of instances needed to hold `total_load` sessions while keeping
/// at least `min_free_capacity` slots free.
///
/// Starting from the current instance count, grows one instance at a time
/// until the projected free capacity reaches the minimum, or shrinks one
/// at a time while the projection stays at or above it. The result is the
/// smallest count satisfying the free-capacity requirement, never below
/// `min_active_instances`.
pub fn compute_target_count(instances: u32, total_load: u32, scaling: &ScalingConfig) -> u32 {
    let per_instance = i64::from(scaling.max_load_per_instance);
    let min_free = i64::from(scaling.min_free_capacity);
    let floor = i64::from(scaling.min_active_instances);

    if per_instance == 0 {
        return instances.max(scaling.min_active_instances);
    }

    let mut needed = i64::from(instances);
    let mut projected_free = needed * per_instance - i64::from(total_load);

    if projected_free < min_free {
        while projected_free < min_free {
            needed += 1;
            projected_free += per_instance;
        }
    } else {
        while needed > floor && projected_free - per_instance >= min_free {
            needed -= 1;
            projected_free -= per_instance;
        }
    }

    u32::try_from(needed.max(floor)).unwrap_or(u32::MAX)
}
