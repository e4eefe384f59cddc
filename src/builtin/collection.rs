//! Sequences, sets, maps and tuples.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{FutureExt, LocalBoxFuture};
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};

use super::wrapper::arg;
use crate::context::{descend, Context};
use crate::convert::{mismatch, Deserializer, Serializer};
use crate::descriptor::{ClassId, TypeDescriptor};
use crate::error::{display_value, ErrorKind, JsonError, PathToken, Result};
use crate::resolve::Resolver;
use crate::shape::{Builtin, Shape, Typed};
use crate::write::{AsyncJsonWriter, JsonWriter};

// -------------------------------- Sequences -------------------------------- //

/// A collection written as a JSON array.
trait Sequence<T>: Sized + 'static {
    fn items(&self) -> Box<dyn Iterator<Item = &T> + '_>;
    /// `Err(index)` names the first entry the collection rejected as a duplicate.
    fn collect(items: Vec<T>) -> std::result::Result<Self, usize>;
}

fn unique<T, C: Default>(items: Vec<T>, mut insert: impl FnMut(&mut C, T) -> bool) -> std::result::Result<C, usize> {
    let mut collection = C::default();
    for (index, item) in items.into_iter().enumerate() {
        if !insert(&mut collection, item) {
            return Err(index);
        }
    }
    Ok(collection)
}

impl<T: 'static> Sequence<T> for Vec<T> {
    fn items(&self) -> Box<dyn Iterator<Item = &T> + '_> { Box::new(self.iter()) }
    fn collect(items: Vec<T>) -> std::result::Result<Self, usize> { Ok(items) }
}

impl<T: 'static> Sequence<T> for VecDeque<T> {
    fn items(&self) -> Box<dyn Iterator<Item = &T> + '_> { Box::new(self.iter()) }
    fn collect(items: Vec<T>) -> std::result::Result<Self, usize> { Ok(items.into()) }
}

impl<T: Eq + Hash + 'static> Sequence<T> for HashSet<T> {
    fn items(&self) -> Box<dyn Iterator<Item = &T> + '_> { Box::new(self.iter()) }
    fn collect(items: Vec<T>) -> std::result::Result<Self, usize> { unique(items, HashSet::insert) }
}

impl<T: Ord + 'static> Sequence<T> for BTreeSet<T> {
    fn items(&self) -> Box<dyn Iterator<Item = &T> + '_> { Box::new(self.iter()) }
    fn collect(items: Vec<T>) -> std::result::Result<Self, usize> { unique(items, BTreeSet::insert) }
}

impl<T: Eq + Hash + 'static> Sequence<T> for IndexSet<T> {
    fn items(&self) -> Box<dyn Iterator<Item = &T> + '_> { Box::new(self.iter()) }
    fn collect(items: Vec<T>) -> std::result::Result<Self, usize> { unique(items, IndexSet::insert) }
}

struct SeqDeserializer<T, C> {
    class: String,
    item: Arc<dyn Deserializer<T>>,
    _marker: PhantomData<fn() -> C>,
}

impl<T, C: Sequence<T>> Deserializer<C> for SeqDeserializer<T, C> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<C> {
        let Value::Array(items) = json else {
            return Err(mismatch(&self.class, json));
        };
        let values = items.iter().enumerate()
            .map(|(index, item)| descend(ctx, PathToken::Index(index), |child| self.item.deserialize(item, child)))
            .collect::<Result<Vec<_>>>()?;
        C::collect(values).map_err(|index| {
            let item = items.get(index).map(display_value).unwrap_or_default();
            JsonError::from(ErrorKind::Duplicate { collection: self.class.clone(), item }).within(index)
        })
    }
}

struct SeqSerializer<T, C> {
    item: Arc<dyn Serializer<T>>,
    _marker: PhantomData<fn(&C)>,
}

impl<T, C: Sequence<T>> Serializer<C> for SeqSerializer<T, C> {
    fn serialize(&self, value: &C, ctx: &Context<'_>) -> Result<Value> {
        value.items().enumerate()
            .map(|(index, item)| descend(ctx, PathToken::Index(index), |child| self.item.serialize(item, child)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    fn write(&self, value: &C, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        out.begin_array()?;
        for (index, item) in value.items().enumerate() {
            if index > 0 {
                out.comma()?;
            }
            descend(ctx, PathToken::Index(index), |child| self.item.write(item, out, child))?;
        }
        out.end_array()
    }

    fn write_async<'a>(
        &'a self,
        value: &'a C,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            out.begin_array().await?;
            for (index, item) in value.items().enumerate() {
                if index > 0 {
                    out.comma().await?;
                }
                let child = ctx.child(index);
                self.item.write_async(item, out, &child).await.map_err(|e| e.within(index))?;
                out.boundary().await?;
            }
            out.end_array().await
        }
        .boxed_local()
    }
}

fn seq_deserializer<T: Typed, C: Sequence<T>>(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
) -> Result<Arc<dyn Deserializer<C>>> {
    let item = resolver.deserializer::<T>(&arg(descriptor, 0)?)?;
    Ok(Arc::new(SeqDeserializer { class: descriptor.to_string(), item, _marker: PhantomData }))
}

fn seq_serializer<T: Typed, C: Sequence<T>>(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
) -> Result<Arc<dyn Serializer<C>>> {
    let item = resolver.serializer::<T>(&arg(descriptor, 0)?)?;
    Ok(Arc::new(SeqSerializer { item, _marker: PhantomData }))
}

macro_rules! sequence {
    ($($coll:ident<T $(: $($bound:path),+)?>),* $(,)?) => {
        $(
            impl<T: Typed $($(+ $bound)+)?> Typed for $coll<T> {
                fn descriptor() -> TypeDescriptor { TypeDescriptor::of::<Self>().with_arg(T::descriptor()) }
                fn shape() -> Shape<Self> { Builtin::new(seq_deserializer::<T, Self>, seq_serializer::<T, Self>).into() }
            }
        )*
    };
}

sequence!(Vec<T>, VecDeque<T>, HashSet<T: Eq, Hash>, BTreeSet<T: Ord>, IndexSet<T: Eq, Hash>);

// ---------------------------------- Maps ----------------------------------- //

/// A collection written as a JSON object.
trait Table<K, V>: Sized + 'static {
    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_>;
    /// `Err(index)` names the first entry whose key was already present.
    fn collect(entries: Vec<(K, V)>) -> std::result::Result<Self, usize>;
}

impl<K: Eq + Hash + 'static, V: 'static> Table<K, V> for HashMap<K, V> {
    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> { Box::new(self.iter()) }
    fn collect(entries: Vec<(K, V)>) -> std::result::Result<Self, usize> {
        unique(entries, |map: &mut Self, (k, v)| map.insert(k, v).is_none())
    }
}

impl<K: Ord + 'static, V: 'static> Table<K, V> for BTreeMap<K, V> {
    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> { Box::new(self.iter()) }
    fn collect(entries: Vec<(K, V)>) -> std::result::Result<Self, usize> {
        unique(entries, |map: &mut Self, (k, v)| map.insert(k, v).is_none())
    }
}

impl<K: Eq + Hash + 'static, V: 'static> Table<K, V> for IndexMap<K, V> {
    fn entries(&self) -> Box<dyn Iterator<Item = (&K, &V)> + '_> { Box::new(self.iter()) }
    fn collect(entries: Vec<(K, V)>) -> std::result::Result<Self, usize> {
        unique(entries, |map: &mut Self, (k, v)| map.insert(k, v).is_none())
    }
}

/// Keys arrive as strings. A key type that rejects the string gets a second
/// try with the key read as JSON, which covers numbers and booleans.
fn read_key<K>(de: &dyn Deserializer<K>, key: &str, ctx: &Context<'_>) -> Result<K> {
    match de.deserialize(&Value::String(key.to_string()), ctx) {
        Ok(value) => Ok(value),
        Err(first) => match serde_json::from_str::<Value>(key) {
            Ok(json @ (Value::Number(_) | Value::Bool(_))) => de.deserialize(&json, ctx),
            _ => Err(first),
        },
    }
}

fn key_text(json: Value) -> Result<String> {
    match json {
        Value::String(s) => Ok(s),
        json @ (Value::Number(_) | Value::Bool(_)) => Ok(json.to_string()),
        other => Err(JsonError::type_mismatch("string, number or boolean map key", &other)),
    }
}

struct MapDeserializer<K, V, M> {
    class: String,
    key: Arc<dyn Deserializer<K>>,
    value: Arc<dyn Deserializer<V>>,
    _marker: PhantomData<fn() -> M>,
}

impl<K, V, M: Table<K, V>> Deserializer<M> for MapDeserializer<K, V, M> {
    fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<M> {
        let Value::Object(object) = json else {
            return Err(mismatch(&self.class, json));
        };
        let mut entries = Vec::with_capacity(object.len());
        for (name, item) in object {
            let entry = descend(ctx, PathToken::from(name.as_str()), |child| {
                Ok((read_key(self.key.as_ref(), name, child)?, self.value.deserialize(item, child)?))
            })?;
            entries.push(entry);
        }
        M::collect(entries).map_err(|index| {
            let name = object.keys().nth(index).cloned().unwrap_or_default();
            JsonError::from(ErrorKind::Duplicate { collection: self.class.clone(), item: name.clone() }).within(name)
        })
    }
}

struct MapSerializer<K, V, M> {
    key: Arc<dyn Serializer<K>>,
    value: Arc<dyn Serializer<V>>,
    _marker: PhantomData<fn(&M)>,
}

impl<K, V, M: Table<K, V>> MapSerializer<K, V, M> {
    fn name(&self, key: &K, ctx: &Context<'_>) -> Result<String> { key_text(self.key.serialize(key, ctx)?) }
}

impl<K, V, M: Table<K, V>> Serializer<M> for MapSerializer<K, V, M> {
    fn serialize(&self, value: &M, ctx: &Context<'_>) -> Result<Value> {
        let mut map = Map::new();
        for (key, item) in value.entries() {
            let name = self.name(key, ctx)?;
            let json = descend(ctx, PathToken::from(name.as_str()), |child| self.value.serialize(item, child))?;
            map.insert(name, json);
        }
        Ok(Value::Object(map))
    }

    fn write(&self, value: &M, out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
        out.begin_object()?;
        for (index, (key, item)) in value.entries().enumerate() {
            if index > 0 {
                out.comma()?;
            }
            let name = self.name(key, ctx)?;
            out.key(&name)?;
            descend(ctx, PathToken::from(name), |child| self.value.write(item, out, child))?;
        }
        out.end_object()
    }

    fn write_async<'a>(
        &'a self,
        value: &'a M,
        out: &'a mut AsyncJsonWriter<'_>,
        ctx: &'a Context<'_>,
    ) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            out.begin_object().await?;
            for (index, (key, item)) in value.entries().enumerate() {
                if index > 0 {
                    out.comma().await?;
                }
                let name = self.name(key, ctx)?;
                out.key(&name).await?;
                let child = ctx.child(name.as_str());
                self.value.write_async(item, out, &child).await.map_err(|e| e.within(name.as_str()))?;
                out.boundary().await?;
            }
            out.end_object().await
        }
        .boxed_local()
    }
}

fn map_deserializer<K: Typed, V: Typed, M: Table<K, V>>(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
) -> Result<Arc<dyn Deserializer<M>>> {
    let key = resolver.deserializer::<K>(&arg(descriptor, 0)?)?;
    let value = resolver.deserializer::<V>(&arg(descriptor, 1)?)?;
    Ok(Arc::new(MapDeserializer { class: descriptor.to_string(), key, value, _marker: PhantomData }))
}

fn map_serializer<K: Typed, V: Typed, M: Table<K, V>>(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
) -> Result<Arc<dyn Serializer<M>>> {
    let key = resolver.serializer::<K>(&arg(descriptor, 0)?)?;
    let value = resolver.serializer::<V>(&arg(descriptor, 1)?)?;
    Ok(Arc::new(MapSerializer { key, value, _marker: PhantomData }))
}

macro_rules! table {
    ($($map:ident<K: $($bound:path),+>),* $(,)?) => {
        $(
            impl<K: Typed $(+ $bound)+, V: Typed> Typed for $map<K, V> {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::of::<Self>().with_args([K::descriptor(), V::descriptor()])
                }
                fn shape() -> Shape<Self> {
                    Builtin::new(map_deserializer::<K, V, Self>, map_serializer::<K, V, Self>).into()
                }
            }
        )*
    };
}

table!(HashMap<K: Eq, Hash>, BTreeMap<K: Ord>, IndexMap<K: Eq, Hash>);

// --------------------------------- Tuples ---------------------------------- //

macro_rules! tuple {
    ($class:literal, $len:literal, $de:ident, $ser:ident, $de_fn:ident, $ser_fn:ident; $($ty:ident $idx:tt $field:ident),+) => {
        struct $de<$($ty),+> {
            class: String,
            $($field: Arc<dyn Deserializer<$ty>>,)+
        }

        impl<$($ty),+> Deserializer<($($ty,)+)> for $de<$($ty),+> {
            fn deserialize(&self, json: &Value, ctx: &Context<'_>) -> Result<($($ty,)+)> {
                match json {
                    Value::Array(items) if items.len() == $len => Ok(($(
                        descend(ctx, PathToken::Index($idx), |child| self.$field.deserialize(&items[$idx], child))?,
                    )+)),
                    _ => Err(mismatch(&self.class, json)),
                }
            }
        }

        struct $ser<$($ty),+> {
            $($field: Arc<dyn Serializer<$ty>>,)+
        }

        impl<$($ty),+> Serializer<($($ty,)+)> for $ser<$($ty),+> {
            fn serialize(&self, value: &($($ty,)+), ctx: &Context<'_>) -> Result<Value> {
                Ok(Value::Array(vec![$(
                    descend(ctx, PathToken::Index($idx), |child| self.$field.serialize(&value.$idx, child))?,
                )+]))
            }

            fn write(&self, value: &($($ty,)+), out: &mut JsonWriter<'_>, ctx: &Context<'_>) -> Result<()> {
                out.begin_array()?;
                $(
                    if $idx > 0 {
                        out.comma()?;
                    }
                    descend(ctx, PathToken::Index($idx), |child| self.$field.write(&value.$idx, out, child))?;
                )+
                out.end_array()
            }

            fn write_async<'a>(
                &'a self,
                value: &'a ($($ty,)+),
                out: &'a mut AsyncJsonWriter<'_>,
                ctx: &'a Context<'_>,
            ) -> LocalBoxFuture<'a, Result<()>> {
                async move {
                    out.begin_array().await?;
                    $(
                        if $idx > 0 {
                            out.comma().await?;
                        }
                        let child = ctx.child($idx as usize);
                        self.$field.write_async(&value.$idx, out, &child).await.map_err(|e| e.within($idx as usize))?;
                        out.boundary().await?;
                    )+
                    out.end_array().await
                }
                .boxed_local()
            }
        }

        fn $de_fn<$($ty: Typed),+>(
            resolver: &mut Resolver<'_>,
            descriptor: &TypeDescriptor,
        ) -> Result<Arc<dyn Deserializer<($($ty,)+)>>> {
            Ok(Arc::new($de {
                class: descriptor.to_string(),
                $($field: resolver.deserializer::<$ty>(&arg(descriptor, $idx)?)?,)+
            }))
        }

        fn $ser_fn<$($ty: Typed),+>(
            resolver: &mut Resolver<'_>,
            descriptor: &TypeDescriptor,
        ) -> Result<Arc<dyn Serializer<($($ty,)+)>>> {
            Ok(Arc::new($ser {
                $($field: resolver.serializer::<$ty>(&arg(descriptor, $idx)?)?,)+
            }))
        }

        impl<$($ty: Typed),+> Typed for ($($ty,)+) {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::class(ClassId::named($class)).with_args([$($ty::descriptor()),+])
            }
            fn shape() -> Shape<Self> { Builtin::new($de_fn::<$($ty),+>, $ser_fn::<$($ty),+>).into() }
        }
    };
}

tuple!("Pair", 2, PairDeserializer, PairSerializer, pair_deserializer, pair_serializer; A 0 a, B 1 b);
tuple!("Triple", 3, TripleDeserializer, TripleSerializer, triple_deserializer, triple_serializer; A 0 a, B 1 b, C 2 c);

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    #[test]
    fn sequences_keep_order_and_paths() {
        let config = Config::new();
        let list: VecDeque<String> = crate::deserialize(&json!(["a", "b"]), &config).unwrap();
        assert_eq!(list, VecDeque::from(vec!["a".to_string(), "b".to_string()]));
        let error = crate::deserialize::<Vec<Vec<i32>>>(&json!([[1], [2, "x"]]), &config).unwrap_err();
        assert_eq!(error.pointer().to_string(), "/1/1");
        assert!(crate::deserialize::<Vec<i32>>(&json!({"0": 1}), &config).is_err());
    }

    #[test]
    fn sets_reject_duplicates() {
        let config = Config::new();
        let set: BTreeSet<i32> = crate::deserialize(&json!([3, 1, 2]), &config).unwrap();
        assert_eq!(crate::serialize(&set, &config).unwrap(), json!([1, 2, 3]));
        let error = crate::deserialize::<HashSet<String>>(&json!(["a", "b", "a"]), &config).unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::Duplicate { item, .. } if item == "\"a\""));
        assert_eq!(error.pointer().to_string(), "/2");
        let ordered: IndexSet<u8> = crate::deserialize(&json!([9, 4]), &config).unwrap();
        assert_eq!(crate::to_string(&ordered, &config).unwrap(), "[9,4]");
    }

    #[test]
    fn map_keys_convert_through_their_type() {
        let config = Config::new();
        let by_id: BTreeMap<u32, String> = crate::deserialize(&json!({"2": "b", "1": "a"}), &config).unwrap();
        assert_eq!(by_id.get(&1).map(String::as_str), Some("a"));
        assert_eq!(crate::to_string(&by_id, &config).unwrap(), r#"{"1":"a","2":"b"}"#);

        let flags: IndexMap<bool, i32> = crate::deserialize(&json!({"true": 1, "false": 0}), &config).unwrap();
        assert_eq!(flags.get_index(0), Some((&true, &1)));

        let error = crate::deserialize::<HashMap<u8, i32>>(&json!({"x": 1}), &config).unwrap_err();
        assert_eq!(error.pointer().to_string(), "/x");
        let clash = crate::deserialize::<HashMap<u8, i32>>(&json!({"1": 1, "1.0": 2}), &config).unwrap_err();
        assert!(matches!(clash.kind(), ErrorKind::Duplicate { .. }));
    }

    #[test]
    fn composite_map_keys_are_rejected() {
        let config = Config::new();
        let mut map = HashMap::new();
        map.insert(vec![1u8], 1u8);
        assert!(matches!(crate::serialize(&map, &config).unwrap_err().kind(), ErrorKind::TypeMismatch { .. }));
    }

    #[test]
    fn tuples_need_exact_length() {
        let config = Config::new();
        let pair: (String, i64) = crate::deserialize(&json!(["a", 1]), &config).unwrap();
        assert_eq!(pair, ("a".to_string(), 1));
        assert_eq!(crate::to_string(&(1u8, true, "x".to_string()), &config).unwrap(), r#"[1,true,"x"]"#);
        assert!(crate::deserialize::<(String, i64)>(&json!(["a"]), &config).is_err());
        let error = crate::deserialize::<(String, i64)>(&json!(["a", "b"]), &config).unwrap_err();
        assert_eq!(error.pointer().to_string(), "/1");
    }
}
