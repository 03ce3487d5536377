use std::sync::{Arc, LazyLock};

use vkrg_shader::reflection::{ReflBufferObject, ReflField};

/// 查找失败时返回的空布局
static DUMMY_BUFFER_OBJECT: LazyLock<Arc<ReflBufferObject>> = LazyLock::new(|| {
    Arc::new(ReflBufferObject {
        name: String::new(),
        instance_name: String::new(),
        binding: 0,
        set: 0,
        full_size: 0,
        fields: vec![],
    })
});

/// 按照反射布局暂存在 CPU 上的 buffer object 数据
///
/// 修改只发生在这里，[`crate::uniform::UniformReflection::flush`] 时整体写入 buffer 资源
///
/// ```ignore
/// let globals = reflection.buffer_data(op, ShaderKind::Fragment, "Globals");
/// globals.field("color").set(&glam::Vec4::ONE);
/// globals.field("lights").at(2).field("position").set(&glam::Vec3::ZERO);
/// ```
#[derive(Clone, Debug)]
pub struct RgBufferData {
    object: Arc<ReflBufferObject>,
    data: Vec<u8>,
}

// new & init
impl RgBufferData {
    pub fn new(object: Arc<ReflBufferObject>) -> Self {
        let data = vec![0; object.full_size as usize];
        Self { object, data }
    }

    /// 没有任何字段的数据，所有写入都被忽略
    pub fn dummy() -> Self {
        Self::new(DUMMY_BUFFER_OBJECT.clone())
    }
}

// getters
impl RgBufferData {
    #[inline]
    pub fn object(&self) -> &Arc<ReflBufferObject> {
        &self.object
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

// update
impl RgBufferData {
    /// 按名字选择顶层字段，找不到时按照断言策略报告，返回的 view 忽略所有写入
    pub fn field(&mut self, name: &str) -> RgBufferView<'_> {
        let Self { object, data } = self;
        let field = object.find(name);
        vkrg_crate_tools::rg_verify!(field.is_some(), "buffer object {} has no field \"{}\"", object.name, name);
        RgBufferView {
            data: data.as_mut_slice(),
            field,
            offset: field.map_or(0, |f| f.offset),
            element: false,
        }
    }

    pub fn set_bytes(&mut self, offset: usize, bytes: &[u8]) {
        let in_range = offset + bytes.len() <= self.data.len();
        if vkrg_crate_tools::rg_verify!(
            in_range,
            "write {} bytes at {} into buffer object {} of {} bytes",
            bytes.len(),
            offset,
            self.object.name,
            self.data.len()
        ) {
            self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
    }
}

/// buffer object 中某个字段（或者数组中的某个元素）的 view
pub struct RgBufferView<'a> {
    data: &'a mut [u8],
    field: Option<&'a ReflField>,
    /// 相对于 buffer object 起始位置的偏移
    offset: u32,
    /// 是否已经通过 `at` 选择了数组中的元素
    element: bool,
}

impl<'a> RgBufferView<'a> {
    #[inline]
    fn invalid(self) -> Self {
        Self { field: None, ..self }
    }

    /// 选择结构体的成员
    pub fn field(self, name: &str) -> Self {
        let Some(parent) = self.field else {
            return self;
        };
        vkrg_crate_tools::rg_verify!(
            !parent.is_array() || self.element,
            "select \"{}\" of array {} without an index",
            name,
            parent.name
        );
        match parent.find(name) {
            Some(field) => {
                let Some(offset) = self.offset.checked_add(field.offset) else {
                    vkrg_crate_tools::rg_verify!(false, "offset of \"{}\" overflows", name);
                    return self.invalid();
                };
                Self {
                    offset,
                    field: Some(field),
                    element: false,
                    data: self.data,
                }
            }
            None => {
                vkrg_crate_tools::rg_verify!(false, "field {} has no member \"{}\"", parent.name, name);
                self.invalid()
            }
        }
    }

    /// 选择数组的第 `index` 个元素，运行时数组不检查上界
    pub fn at(self, index: u32) -> Self {
        let Some(field) = self.field else {
            return self;
        };
        let valid = field.is_array() && !self.element && (field.array_size == 0 || index < field.array_size);
        if !vkrg_crate_tools::rg_verify!(valid, "index {} of field {} (array size {})", index, field.name, field.array_size)
        {
            return self.invalid();
        }
        let Some(offset) = index.checked_mul(field.array_stride).and_then(|o| o.checked_add(self.offset)) else {
            vkrg_crate_tools::rg_verify!(false, "offset of {}[{}] overflows", field.name, index);
            return self.invalid();
        };
        Self {
            offset,
            element: true,
            ..self
        }
    }

    /// 当前选择的字节数
    pub fn size(&self) -> usize {
        match self.field {
            Some(field) if self.element => field.element_size() as usize,
            Some(field) => field.size as usize,
            None => 0,
        }
    }

    fn range(&self, size: usize) -> Option<std::ops::Range<usize>> {
        self.field?;
        let start = self.offset as usize;
        let valid = size == self.size() && start.checked_add(size).is_some_and(|end| end <= self.data.len());
        let valid = vkrg_crate_tools::rg_verify!(
            valid,
            "access {} bytes of a {} bytes field at offset {} (buffer object size {})",
            size,
            self.size(),
            start,
            self.data.len()
        );
        valid.then_some(start..start + size)
    }

    /// 值的大小必须与字段的大小相同
    pub fn set<T: bytemuck::Pod>(self, value: &T) {
        self.set_bytes(bytemuck::bytes_of(value));
    }

    pub fn set_bytes(self, bytes: &[u8]) {
        if let Some(range) = self.range(bytes.len()) {
            self.data[range].copy_from_slice(bytes);
        }
    }

    /// 大小不匹配或者字段不存在时返回全 0
    pub fn get<T: bytemuck::Pod>(&self) -> T {
        self.range(size_of::<T>())
            .map_or_else(T::zeroed, |range| bytemuck::pod_read_unaligned(&self.data[range]))
    }

    pub fn bytes(&self) -> &[u8] {
        match self.field {
            Some(_) => {
                let start = (self.offset as usize).min(self.data.len());
                let end = start.saturating_add(self.size()).min(self.data.len());
                &self.data[start..end]
            }
            None => &[],
        }
    }
}
