//! Type descriptors: the structural key that resolution, custom-mapping
//! selection and the converter caches all run on.
//!
//! A descriptor is a class identity plus ordered type arguments plus a
//! nullability flag. Declared types inside class metadata may also use
//! type-parameter placeholders which are substituted against the actual
//! arguments of the enclosing result type before resolution recurses.
use std::any::type_name;
use std::fmt;

// ------------------------------ Class identity ------------------------------ //

/// Identity of a type family, e.g. `alloc::vec::Vec` for every `Vec<T>`.
///
/// Derived from the Rust type name with its generic arguments stripped, so all
/// instantiations of a generic type share one class identity and differ only
/// in their descriptor arguments.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(&'static str);

impl ClassId {
    pub fn of<T: ?Sized + 'static>() -> Self { Self(family_path(type_name::<T>())) }
    pub const fn named(path: &'static str) -> Self { Self(path) }
    pub fn path(&self) -> &'static str { self.0 }

    /// Last path segment, used for display and default discriminator values.
    pub fn simple_name(&self) -> &'static str {
        self.0.rsplit("::").next().unwrap_or(self.0)
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.0) }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.simple_name()) }
}

fn family_path(full: &'static str) -> &'static str {
    match full.find('<') {
        Some(i) => &full[..i],
        None => full,
    }
}

// ----------------------------- Type descriptor ------------------------------ //

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Class(ClassId),
    Param(&'static str),
}

/// Class identity + type arguments + nullability.
///
/// Two descriptors are equal iff the class, every argument (recursively) and
/// the nullability flag are equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    kind: Kind,
    args: Vec<TypeDescriptor>,
    nullable: bool,
}

impl TypeDescriptor {
    /// Non-generic descriptor for `T`'s class.
    pub fn of<T: ?Sized + 'static>() -> Self { Self::class(ClassId::of::<T>()) }

    pub fn class(class: ClassId) -> Self {
        Self { kind: Kind::Class(class), args: Vec::new(), nullable: false }
    }

    /// Placeholder for a class type parameter, e.g. `V` in `Wrapper<V>`.
    pub fn param(name: &'static str) -> Self {
        Self { kind: Kind::Param(name), args: Vec::new(), nullable: false }
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_arg(mut self, arg: TypeDescriptor) -> Self {
        self.args.push(arg);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn non_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn is_nullable(&self) -> bool { self.nullable }
    pub fn args(&self) -> &[TypeDescriptor] { &self.args }
    pub fn is_param(&self) -> bool { matches!(self.kind, Kind::Param(_)) }

    pub fn class_id(&self) -> Option<ClassId> {
        match self.kind {
            Kind::Class(class) => Some(class),
            Kind::Param(_) => None,
        }
    }

    /// True when no placeholder appears anywhere in the descriptor.
    pub fn is_concrete(&self) -> bool {
        !self.is_param() && self.args.iter().all(TypeDescriptor::is_concrete)
    }

    /// Replace placeholders using `params[i] -> args[i]`.
    ///
    /// A nullable placeholder stays nullable after substitution. Returns the
    /// name of the first placeholder with no binding.
    pub fn substitute(
        &self,
        params: &[&'static str],
        args: &[TypeDescriptor],
    ) -> Result<TypeDescriptor, &'static str> {
        match self.kind {
            Kind::Param(name) => {
                let index = params.iter().position(|p| *p == name).ok_or(name)?;
                let bound = args.get(index).ok_or(name)?.clone();
                Ok(if self.nullable { bound.nullable() } else { bound })
            }
            Kind::Class(_) => {
                let args = self.args.iter()
                    .map(|a| a.substitute(params, args))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TypeDescriptor { kind: self.kind, args, nullable: self.nullable })
            }
        }
    }

    /// `self <: other` under the descriptor-level rules: equal class and
    /// identical arguments, and a nullable type is never a subtype of a
    /// non-nullable one.
    pub fn is_subtype_of(&self, other: &TypeDescriptor) -> bool {
        self.kind == other.kind
            && self.args == other.args
            && (!self.nullable || other.nullable)
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Class(class) => write!(f, "{class}")?,
            Kind::Param(name) => f.write_str(name)?,
        }
        if !self.args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 { f.write_str(", ")?; }
                write!(f, "{arg}")?;
            }
            f.write_str(">")?;
        }
        if self.nullable { f.write_str("?")?; }
        Ok(())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { fmt::Display::fmt(self, f) }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    struct Wrapper<V>(V);

    #[test]
    fn class_identity_strips_generic_arguments() {
        assert_eq!(ClassId::of::<Vec<i32>>(), ClassId::of::<Vec<String>>());
        assert_eq!(ClassId::of::<Vec<i32>>().simple_name(), "Vec");
        assert_ne!(ClassId::of::<Wrapper<i32>>(), ClassId::of::<Vec<i32>>());
        assert_eq!(ClassId::of::<Wrapper<u8>>().simple_name(), "Wrapper");
    }

    #[test]
    fn equality_includes_arguments_and_nullability() {
        let list = |arg| TypeDescriptor::of::<Vec<()>>().with_arg(arg);
        let a = list(TypeDescriptor::of::<String>());
        let b = list(TypeDescriptor::of::<String>());
        let c = list(TypeDescriptor::of::<String>().nullable());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, a.clone().nullable());
        assert_eq!(format!("{c}"), "Vec<String?>");
    }

    #[test]
    fn substitution_binds_placeholders_recursively() {
        let declared = TypeDescriptor::of::<Vec<()>>().with_arg(TypeDescriptor::param("V").nullable());
        let actual = declared.substitute(&["K", "V"], &[
            TypeDescriptor::of::<String>(),
            TypeDescriptor::of::<i64>(),
        ]).unwrap();
        assert!(actual.is_concrete());
        assert_eq!(actual, TypeDescriptor::of::<Vec<()>>().with_arg(TypeDescriptor::of::<i64>().nullable()));

        let unbound = declared.substitute(&["K"], &[TypeDescriptor::of::<String>()]);
        assert_eq!(unbound, Err("V"));
    }

    #[test]
    fn nullability_drives_subtyping() {
        let s = TypeDescriptor::of::<String>();
        assert!(s.is_subtype_of(&s.clone().nullable()));
        assert!(!s.clone().nullable().is_subtype_of(&s));
        assert!(s.is_subtype_of(&s));
        assert!(!s.is_subtype_of(&TypeDescriptor::of::<i32>()));
    }
}
