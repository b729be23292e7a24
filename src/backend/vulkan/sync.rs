// Synchronization primitives and submission
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync, plus the command
// buffers each frame slot records into. One resettable pool per command
// buffer keeps slots independent of each other.

use ash::vk;

use crate::backend::Submission;
use crate::error::Result;

pub fn create_command_buffer(
    device: &ash::Device,
    queue_family: u32,
) -> Result<(vk::CommandPool, vk::CommandBuffer)> {
    let pool_info = vk::CommandPoolCreateInfo::default()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family);
    let pool = unsafe { device.create_command_pool(&pool_info, None) }?;

    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    match unsafe { device.allocate_command_buffers(&alloc_info) } {
        Ok(buffers) => Ok((pool, buffers[0])),
        Err(err) => {
            unsafe { device.destroy_command_pool(pool, None) };
            Err(err.into())
        }
    }
}

pub fn destroy_command_buffer(device: &ash::Device, pool: vk::CommandPool, cb: vk::CommandBuffer) {
    unsafe {
        device.free_command_buffers(pool, &[cb]);
        device.destroy_command_pool(pool, None);
    }
}

pub fn begin_command_buffer(device: &ash::Device, cb: vk::CommandBuffer) -> Result<()> {
    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { device.begin_command_buffer(cb, &begin_info) }?;
    Ok(())
}

pub fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None) }?;
    Ok(fence)
}

pub fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let semaphore = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }?;
    Ok(semaphore)
}

pub fn submit(device: &ash::Device, queue: vk::Queue, submission: &Submission) -> Result<()> {
    let wait_semaphores: Vec<vk::Semaphore> = submission.wait_semaphore.into_iter().collect();
    let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
    let signal_semaphores: Vec<vk::Semaphore> = submission.signal_semaphore.into_iter().collect();
    let command_buffers = [submission.command_buffer];

    let submit_info = vk::SubmitInfo::default()
        .wait_semaphores(&wait_semaphores)
        .wait_dst_stage_mask(&wait_stages[..wait_semaphores.len()])
        .command_buffers(&command_buffers)
        .signal_semaphores(&signal_semaphores);

    unsafe { device.queue_submit(queue, &[submit_info], submission.fence) }?;
    Ok(())
}
