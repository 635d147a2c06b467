//! Command buffer management.

use crate::error::Result;
use crate::sync::{create_fence, wait_for_fence};
use ash::vk;

/// Command pool for allocating command buffers.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// Create a new command pool.
    ///
    /// # Safety
    /// The device must be valid and the queue family must exist.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);

        let pool = unsafe { device.create_command_pool(&create_info, None)? };

        Ok(Self { pool, queue_family })
    }

    /// Get the raw pool handle.
    pub const fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Get the queue family index.
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate a single primary command buffer.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn allocate_primary(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or(crate::GpuError::Vulkan(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
    }

    /// Destroy the command pool.
    ///
    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// Record `f` into a fresh command buffer, submit it and wait on a fence.
///
/// The command buffer and fence are released whether or not the submission
/// succeeds.
///
/// # Safety
/// All handles must be valid and `queue` must belong to the pool's family.
pub unsafe fn execute_single_time_commands<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    f: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let cmd = unsafe { pool.allocate_primary(device)? };
    let fence = match unsafe { create_fence(device, false) } {
        Ok(fence) => fence,
        Err(e) => {
            unsafe { device.free_command_buffers(pool.handle(), &[cmd]) };
            return Err(e);
        }
    };

    let result = unsafe { record_and_submit(device, cmd, queue, fence, f) };

    unsafe {
        device.destroy_fence(fence, None);
        device.free_command_buffers(pool.handle(), &[cmd]);
    }

    result
}

unsafe fn record_and_submit<F>(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    queue: vk::Queue,
    fence: vk::Fence,
    f: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer),
{
    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(cmd, &begin_info)? };
    f(cmd);
    unsafe { device.end_command_buffer(cmd)? };

    let cmd_buffers = [cmd];
    let submit_info = vk::SubmitInfo::default().command_buffers(&cmd_buffers);
    unsafe {
        device.queue_submit(queue, &[submit_info], fence)?;
        wait_for_fence(device, fence, u64::MAX)
    }
}
