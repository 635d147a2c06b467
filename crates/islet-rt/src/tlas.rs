//! Top-level instance descriptors.

use crate::backend::{InstanceDesc, InstanceFlags, RayTracingBackend};
use crate::error::{Result, RtError};
use crate::instance::SceneInstance;
use islet_core::constants::INSTANCE_MASK_ALL;
use islet_core::math::affine_rows;

/// One descriptor per instance that has a BLAS, in scene order.
///
/// The record index of each descriptor is its instance's position in the
/// scene, which is also its row in the hit-group table.
pub fn instance_descs<B: RayTracingBackend + ?Sized>(
    backend: &B,
    instances: &[SceneInstance],
) -> Result<Vec<InstanceDesc>> {
    let mut descs = Vec::with_capacity(instances.len());
    for (row, instance) in instances.iter().enumerate() {
        let Some(blas) = instance.mesh().blas() else {
            tracing::warn!(
                "Instance {:?} uses mesh '{}' without a BLAS; it will not be traced",
                instance.id(),
                instance.mesh().label()
            );
            continue;
        };
        let blas_address = backend.acceleration_structure_address(blas)?;
        let row = u32::try_from(row)
            .map_err(|_| RtError::Backend(format!("instance row {row} exceeds u32")))?;
        descs.push(InstanceDesc::new(
            affine_rows(instance.world()),
            blas_address,
            row,
            row,
            INSTANCE_MASK_ALL,
            InstanceFlags::TRIANGLE_FACING_CULL_DISABLE,
        ));
    }
    Ok(descs)
}
