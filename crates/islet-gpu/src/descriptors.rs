//! Descriptor set management.

use crate::error::Result;
use ash::vk;

/// Descriptor set layout builder.
///
/// Bindings may carry `DescriptorBindingFlags`; the flags chain is only
/// attached when at least one binding uses it.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
    flags: Vec<vk::DescriptorBindingFlags>,
}

impl DescriptorSetLayoutBuilder<'_> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    #[must_use]
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
        flags: vk::DescriptorBindingFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self.flags.push(flags);
        self
    }

    /// Add a partially bound, variable sized array of storage buffers.
    ///
    /// `max_count` is the upper bound; the real size is chosen per set with
    /// [`DescriptorPool::allocate_variable`]. Must be the highest binding.
    #[must_use]
    pub fn storage_buffer_array(
        self,
        binding: u32,
        max_count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            max_count,
            stage_flags,
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT,
        )
    }

    /// Add a uniform buffer binding.
    #[must_use]
    pub fn uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            stage_flags,
            vk::DescriptorBindingFlags::empty(),
        )
    }

    /// Add a storage image binding.
    #[must_use]
    pub fn storage_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::STORAGE_IMAGE,
            1,
            stage_flags,
            vk::DescriptorBindingFlags::empty(),
        )
    }

    /// Add an acceleration structure binding. Partially bound so the set stays
    /// valid while the scene is empty.
    #[must_use]
    pub fn acceleration_structure(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
            1,
            stage_flags,
            vk::DescriptorBindingFlags::PARTIALLY_BOUND,
        )
    }

    /// Build the descriptor set layout.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(&self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&self.flags);
        let mut layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        if self.flags.iter().any(|f| !f.is_empty()) {
            layout_info = layout_info.push_next(&mut flags_info);
        }

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };
        Ok(layout)
    }
}

/// Descriptor pool for allocating descriptor sets.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };
        Ok(Self { pool })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate descriptor sets.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { device.allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Allocate one set whose variable-count binding holds `count` descriptors.
    ///
    /// # Safety
    /// The device must be valid and `layout` must end in a variable-count binding.
    pub unsafe fn allocate_variable(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> Result<vk::DescriptorSet> {
        let counts = [count];
        let mut variable_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
            .descriptor_counts(&counts);
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts)
            .push_next(&mut variable_info);

        let sets = unsafe { device.allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }

    /// Destroy the pool and every set allocated from it.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Write a buffer descriptor into one array element of a binding.
///
/// # Safety
/// Device and buffer must be valid.
pub unsafe fn write_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    array_element: u32,
    descriptor_type: vk::DescriptorType,
    buffer: vk::Buffer,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .dst_array_element(array_element)
        .descriptor_type(descriptor_type)
        .buffer_info(std::slice::from_ref(&buffer_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Write a storage image descriptor in `GENERAL` layout.
///
/// # Safety
/// Device and image view must be valid.
pub unsafe fn write_storage_image(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .image_layout(vk::ImageLayout::GENERAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(std::slice::from_ref(&image_info));

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Write an acceleration structure descriptor.
///
/// # Safety
/// Device and acceleration structure must be valid.
pub unsafe fn write_acceleration_structure(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    acceleration_structure: vk::AccelerationStructureKHR,
) {
    let structures = [acceleration_structure];
    let mut as_info = vk::WriteDescriptorSetAccelerationStructureKHR::default()
        .acceleration_structures(&structures);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
        .descriptor_count(1)
        .push_next(&mut as_info);

    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_follow_bindings() {
        let stages = vk::ShaderStageFlags::RAYGEN_KHR;
        let builder = DescriptorSetLayoutBuilder::new()
            .acceleration_structure(0, stages)
            .uniform_buffer(1, stages)
            .storage_buffer_array(2, 1024, stages);

        assert_eq!(builder.bindings.len(), builder.flags.len());
        assert!(builder.flags[1].is_empty());
        assert!(builder.flags[2].contains(
            vk::DescriptorBindingFlags::PARTIALLY_BOUND
                | vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
        ));
        assert_eq!(builder.bindings[2].descriptor_count, 1024);
    }
}
