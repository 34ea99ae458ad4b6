// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Result};
use ash::vk;

/// First memory type allowed by `type_bits` that has every flag in `req`.
pub fn pick_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0 && props.memory_types[i as usize].property_flags.contains(req)
    })
}

pub unsafe fn find_memory_type(
    instance: &ash::Instance,
    phys: vk::PhysicalDevice,
    type_bits: u32,
    req: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let props = instance.get_physical_device_memory_properties(phys);
    pick_memory_type(&props, type_bits, req)
        .ok_or_else(|| anyhow!("no memory type with {req:?} in mask {type_bits:#b}"))
}

pub unsafe fn create_buffer_and_memory(
    instance: &ash::Instance,
    device: &ash::Device,
    phys: vk::PhysicalDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    props: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let bci = vk::BufferCreateInfo {
        s_type: vk::StructureType::BUFFER_CREATE_INFO,
        size,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    };
    let buf = device.create_buffer(&bci, None)?;
    let req = device.get_buffer_memory_requirements(buf);
    let mem = find_memory_type(instance, phys, req.memory_type_bits, props).and_then(|ty| {
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: ty,
            ..Default::default()
        };
        Ok(device.allocate_memory(&mai, None)?)
    });
    let mem = match mem {
        Ok(m) => m,
        Err(e) => {
            device.destroy_buffer(buf, None);
            return Err(e);
        }
    };
    if let Err(e) = device.bind_buffer_memory(buf, mem, 0) {
        device.destroy_buffer(buf, None);
        device.free_memory(mem, None);
        return Err(e.into());
    }
    Ok((buf, mem))
}

pub unsafe fn create_image_and_memory(
    instance: &ash::Instance,
    device: &ash::Device,
    phys: vk::PhysicalDevice,
    format: vk::Format,
    extent: vk::Extent2D,
    usage: vk::ImageUsageFlags,
) -> Result<(vk::Image, vk::DeviceMemory)> {
    let ici = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    };
    let image = device.create_image(&ici, None)?;
    let req = device.get_image_memory_requirements(image);
    let mem = find_memory_type(
        instance,
        phys,
        req.memory_type_bits,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )
    .and_then(|ty| {
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: ty,
            ..Default::default()
        };
        Ok(device.allocate_memory(&mai, None)?)
    });
    let mem = match mem {
        Ok(m) => m,
        Err(e) => {
            device.destroy_image(image, None);
            return Err(e);
        }
    };
    if let Err(e) = device.bind_image_memory(image, mem, 0) {
        device.destroy_image(image, None);
        device.free_memory(mem, None);
        return Err(e.into());
    }
    Ok((image, mem))
}

/// Copies `data` into host-visible, host-coherent `mem`.
pub unsafe fn write_mapped(device: &ash::Device, mem: vk::DeviceMemory, data: &[u8]) -> Result<()> {
    let ptr = device.map_memory(
        mem,
        0,
        data.len() as vk::DeviceSize,
        vk::MemoryMapFlags::empty(),
    )?;
    std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
    device.unmap_memory(mem);
    Ok(())
}

pub const STAGING_PROPS: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Buffer plus the memory bound to it; freed together.
#[derive(Clone, Copy, Debug)]
pub struct BufferAlloc {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
}

impl BufferAlloc {
    pub fn null() -> Self {
        Self {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
        }
    }

    pub unsafe fn destroy(self, device: &ash::Device) {
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }
}
