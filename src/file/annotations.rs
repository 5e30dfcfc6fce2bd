use plain::Plain;

use crate::{dex_err, error::DexError, Result};

use super::{
    AnnotationItem, AnnotationSetItem, AnnotationsDirectoryItem, ClassDef,
    DexContainer, DexFile, FieldAnnotationsItem, MethodAnnotationsItem, ParameterAnnotationsItem,
};

//------------------------------------------------------------------------------
// ClassAnnotationsAccessor
//------------------------------------------------------------------------------
/// Typed views over one class' annotations_directory_item.
pub struct ClassAnnotationsAccessor<'a> {
    class_def: &'a ClassDef,

    field_annotations: &'a [FieldAnnotationsItem],
    method_annotations: &'a [MethodAnnotationsItem],
    parameter_annotations: &'a [ParameterAnnotationsItem],
    class_annotations: AnnotationSetItem<'a>,
}

impl<'a, C: DexContainer<'a>> DexFile<'a, C> {
    pub fn get_class_annotation_accessor(
        &self,
        class_def: &'a ClassDef,
    ) -> Result<ClassAnnotationsAccessor<'a>> {
        ClassAnnotationsAccessor::new(self, class_def)
    }

    /// The annotation_set_item at `offset`: file offsets of its
    /// annotation_items. Offset 0 yields an empty set.
    pub fn get_annotation_set(&self, offset: u32) -> Result<AnnotationSetItem<'a>> {
        if offset == 0 {
            return Ok(&[]);
        }

        check_lt_result!(offset, self.file_size(), "annotation set offset");
        let bytes = self.image_bytes();
        let size = match u32::from_bytes(&bytes[offset as usize..]) {
            Ok(size) => *size,
            Err(plain::Error::TooShort) => {
                return dex_err!(DexLayoutError, self, offset, "AnnotationSetItem", 0)
            }
            Err(_) => {
                return dex_err!(BadAlignment {
                    offset,
                    section: "annotation set"
                })
            }
        };
        let data_off = offset + std::mem::size_of::<u32>() as u32;
        self.non_null_array_data_ptr(data_off, size as usize)
    }

    /// Parses the annotation_item at `offset`.
    pub fn get_annotation_item(&self, offset: u32) -> Result<AnnotationItem> {
        check_lt_result!(offset, self.file_size(), "annotation item offset");
        AnnotationItem::from_raw_parts(&self.image_bytes()[offset as usize..])
    }
}

impl<'a> ClassAnnotationsAccessor<'a> {
    pub fn new<C>(dex: &DexFile<'a, C>, class_def: &'a ClassDef) -> Result<Self>
    where
        C: DexContainer<'a>,
    {
        let Some(directory) = dex.data_ptr::<AnnotationsDirectoryItem>(class_def.annotations_off)?
        else {
            return Ok(ClassAnnotationsAccessor::new_empty(class_def));
        };

        let mut offset =
            class_def.annotations_off + std::mem::size_of::<AnnotationsDirectoryItem>() as u32;

        let field_annotations = read_member_list::<FieldAnnotationsItem, C>(
            dex,
            &mut offset,
            directory.fields_size,
        )?;
        let method_annotations = read_member_list::<MethodAnnotationsItem, C>(
            dex,
            &mut offset,
            directory.methods_size,
        )?;
        let parameter_annotations = read_member_list::<ParameterAnnotationsItem, C>(
            dex,
            &mut offset,
            directory.parameters_size,
        )?;
        let class_annotations = dex.get_annotation_set(directory.class_annotations_off)?;

        Ok(Self {
            class_def,
            field_annotations,
            method_annotations,
            parameter_annotations,
            class_annotations,
        })
    }

    pub fn new_empty(class_def: &'a ClassDef) -> Self {
        Self {
            class_def,
            field_annotations: &[],
            method_annotations: &[],
            parameter_annotations: &[],
            class_annotations: &[],
        }
    }

    #[inline]
    pub fn get_class_def(&self) -> &'a ClassDef {
        self.class_def
    }

    #[inline]
    pub fn get_field_annotations(&self) -> &'a [FieldAnnotationsItem] {
        self.field_annotations
    }

    #[inline]
    pub fn get_method_annotations(&self) -> &'a [MethodAnnotationsItem] {
        self.method_annotations
    }

    #[inline]
    pub fn get_parameter_annotations(&self) -> &'a [ParameterAnnotationsItem] {
        self.parameter_annotations
    }

    #[inline]
    pub fn get_class_annotations(&self) -> AnnotationSetItem<'a> {
        self.class_annotations
    }
}

fn read_member_list<'a, T: Plain, C: DexContainer<'a>>(
    dex: &DexFile<'a, C>,
    offset: &mut u32,
    size: u32,
) -> Result<&'a [T]> {
    if size == 0 {
        return Ok(&[]);
    }
    let list = dex.non_null_array_data_ptr::<T>(*offset, size as usize)?;
    *offset = offset.saturating_add(size.saturating_mul(std::mem::size_of::<T>() as u32));
    Ok(list)
}
