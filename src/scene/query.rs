//! Joined iteration over several component types.

use std::any::TypeId;

use crate::scene::{Component, Scene, SceneObject};

/**
 * A tuple of component types visited together by [`Scene::for_each`].
 *
 * The first type drives the iteration: its storage is walked in insertion
 * order and an object is visited only if it also holds every other type.
 */
pub trait Query {
    type Item<'a>;

    fn type_ids() -> Vec<TypeId>;

    /// Build the item for `object`, whose driving component is at `first`.
    ///
    /// # Safety
    /// `first` must point at a live component of the first type owned by
    /// `object`, and no other reference to any of `object`'s components of
    /// the queried types may exist while the item is alive.
    unsafe fn fetch<'a>(scene: &'a Scene, object: &SceneObject, first: *mut u8) -> Option<Self::Item<'a>>;
}

macro_rules! impl_query {
    ($first:ident $(, $rest:ident)*) => {
        impl<$first: Component $(, $rest: Component)*> Query for ($first, $($rest,)*) {
            type Item<'a> = (&'a mut $first, $(&'a mut $rest,)*);

            fn type_ids() -> Vec<TypeId> {
                vec![TypeId::of::<$first>() $(, TypeId::of::<$rest>())*]
            }

            #[allow(non_snake_case)]
            unsafe fn fetch<'a>(scene: &'a Scene, object: &SceneObject, first: *mut u8) -> Option<Self::Item<'a>> {
                let _ = (scene, object);
                $(let $rest = scene.value_ptr(object, TypeId::of::<$rest>())?;)*
                // SAFETY: distinct types live in distinct storages, so the references never alias.
                unsafe { Some((&mut *first.cast::<$first>(), $(&mut *$rest.cast::<$rest>(),)*)) }
            }
        }
    };
}

impl_query!(A);
impl_query!(A, B);
impl_query!(A, B, C);
impl_query!(A, B, C, D);
