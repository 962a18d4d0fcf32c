use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::symbol::Symbol;
use crate::util::sync;
use crate::util::{FastHashMap, fast_hash_map_new};
use crate::val::Val;
use crate::vm::Invokable;

/// Storage shape of instances. Compared by identity: a class gets a fresh
/// layout object whenever its field list changes.
#[derive(Debug)]
pub struct ObjectLayout {
    field_count: usize,
}

impl ObjectLayout {
    pub fn field_count(&self) -> usize {
        self.field_count
    }
}

pub struct Class {
    name: Symbol,
    superclass: Option<Arc<Class>>,
    metaclass: OnceCell<Arc<Class>>,
    fields: RwLock<Vec<Symbol>>,
    layout: RwLock<Arc<ObjectLayout>>,
    methods: RwLock<FastHashMap<Symbol, Invokable>>,
}

impl Class {
    fn raw(name: &str, superclass: Option<&Arc<Class>>, own_fields: &[&str]) -> Arc<Class> {
        let mut fields = superclass.map(|s| s.field_names()).unwrap_or_default();
        fields.extend(own_fields.iter().map(|f| Symbol::intern(f)));
        let layout = Arc::new(ObjectLayout {
            field_count: fields.len(),
        });
        Arc::new(Class {
            name: Symbol::intern(name),
            superclass: superclass.cloned(),
            metaclass: OnceCell::new(),
            fields: RwLock::new(fields),
            layout: RwLock::new(layout),
            methods: RwLock::new(fast_hash_map_new()),
        })
    }

    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn superclass(&self) -> Option<&Arc<Class>> {
        self.superclass.as_ref()
    }

    /// `None` for metaclasses themselves, whose class is `Metaclass`.
    pub fn metaclass(&self) -> Option<&Arc<Class>> {
        self.metaclass.get()
    }

    pub fn layout(&self) -> Arc<ObjectLayout> {
        sync::read(&self.layout).clone()
    }

    /// All instance variable names, inherited ones first.
    pub fn field_names(&self) -> Vec<Symbol> {
        sync::read(&self.fields).clone()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        let sym = Symbol::intern(name);
        sync::read(&self.fields).iter().position(|f| *f == sym)
    }

    pub fn local_method(&self, selector: Symbol) -> Option<Invokable> {
        sync::read(&self.methods).get(&selector).cloned()
    }

    pub fn selectors(&self) -> Vec<Symbol> {
        let mut sels: Vec<Symbol> = sync::read(&self.methods).keys().copied().collect();
        sels.sort_by_key(|s| s.as_str());
        sels
    }
}

impl std::fmt::Debug for Class {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Class({})", self.name)
    }
}

/// The bootstrap classes every program can rely on.
pub struct CoreClasses {
    pub object: Arc<Class>,
    pub class: Arc<Class>,
    pub metaclass: Arc<Class>,
    pub nil: Arc<Class>,
    pub boolean: Arc<Class>,
    pub true_class: Arc<Class>,
    pub false_class: Arc<Class>,
    pub integer: Arc<Class>,
    pub double: Arc<Class>,
    pub string: Arc<Class>,
    pub symbol: Arc<Class>,
    pub array: Arc<Class>,
    pub block: Arc<Class>,
    pub system: Arc<Class>,
}

/// Class registry and method lookup.
///
/// Every method installation bumps `epoch`; cached lookups remember the epoch
/// they were made under and are ignored once it moves.
pub struct ClassTable {
    core: CoreClasses,
    by_name: RwLock<FastHashMap<Symbol, Arc<Class>>>,
    epoch: AtomicU64,
}

impl ClassTable {
    pub fn new() -> Self {
        let object = Class::raw("Object", None, &[]);
        let class = Class::raw("Class", Some(&object), &[]);
        let metaclass = Class::raw("Metaclass", Some(&class), &[]);
        attach_metaclass(&object, &class);
        attach_metaclass(&class, &class);
        attach_metaclass(&metaclass, &class);

        let sub = |name: &str, superclass: &Arc<Class>| {
            let c = Class::raw(name, Some(superclass), &[]);
            attach_metaclass(&c, &class);
            c
        };
        let nil = sub("Nil", &object);
        let boolean = sub("Boolean", &object);
        let true_class = sub("True", &boolean);
        let false_class = sub("False", &boolean);
        let integer = sub("Integer", &object);
        let double = sub("Double", &object);
        let string = sub("String", &object);
        let symbol = sub("Symbol", &string);
        let array = sub("Array", &object);
        let block = sub("Block", &object);
        let system = sub("System", &object);

        let core = CoreClasses {
            object,
            class,
            metaclass,
            nil,
            boolean,
            true_class,
            false_class,
            integer,
            double,
            string,
            symbol,
            array,
            block,
            system,
        };
        let mut by_name = fast_hash_map_new();
        for c in core.all() {
            by_name.insert(c.name(), c.clone());
        }
        Self {
            core,
            by_name: RwLock::new(by_name),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Class of a runtime value. Classes are instances of their metaclass.
    #[inline]
    pub fn class_of<'a>(&'a self, value: &'a Val) -> &'a Arc<Class> {
        match value {
            Val::Nil => &self.core.nil,
            Val::Bool(true) => &self.core.true_class,
            Val::Bool(false) => &self.core.false_class,
            Val::Int(_) | Val::BigInt(_) => &self.core.integer,
            Val::Double(_) => &self.core.double,
            Val::Str(_) => &self.core.string,
            Val::Symbol(_) => &self.core.symbol,
            Val::Array(_) => &self.core.array,
            Val::Block(_) => &self.core.block,
            Val::Object(o) => o.class(),
            Val::Class(c) => c.metaclass().unwrap_or(&self.core.metaclass),
        }
    }

    /// Full dynamic lookup along the superclass chain.
    pub fn lookup(&self, class: &Arc<Class>, selector: Symbol) -> Option<Invokable> {
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(m) = c.local_method(selector) {
                return Some(m);
            }
            current = c.superclass();
        }
        None
    }

    pub fn understands(&self, value: &Val, selector: Symbol) -> bool {
        self.lookup(self.class_of(value), selector).is_some()
    }

    pub fn install(&self, class: &Arc<Class>, invokable: Invokable) {
        sync::write(&class.methods).insert(invokable.signature(), invokable);
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn define_class(&self, name: &str, superclass: &Arc<Class>, fields: &[&str]) -> Arc<Class> {
        let c = Class::raw(name, Some(superclass), fields);
        attach_metaclass(&c, &self.core.class);
        sync::write(&self.by_name).insert(c.name(), c.clone());
        c
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<Class>> {
        sync::read(&self.by_name).get(&Symbol::intern(name)).cloned()
    }

    /// Appends an instance variable and publishes a new layout. Existing
    /// instances migrate on their next layout check.
    pub fn add_field(&self, class: &Arc<Class>, name: &str) -> usize {
        let mut fields = sync::write(&class.fields);
        fields.push(Symbol::intern(name));
        let count = fields.len();
        *sync::write(&class.layout) = Arc::new(ObjectLayout { field_count: count });
        tracing::debug!(target: "sprig::vm::dispatch", class = %class.name(), fields = count, "layout changed");
        count - 1
    }

    pub fn classes(&self) -> Vec<Arc<Class>> {
        sync::read(&self.by_name).values().cloned().collect()
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreClasses {
    fn all(&self) -> [&Arc<Class>; 14] {
        [
            &self.object,
            &self.class,
            &self.metaclass,
            &self.nil,
            &self.boolean,
            &self.true_class,
            &self.false_class,
            &self.integer,
            &self.double,
            &self.string,
            &self.symbol,
            &self.array,
            &self.block,
            &self.system,
        ]
    }
}

/// Creates `<name> class`, whose superclass is the superclass's metaclass
/// (or `Class` at the root of the hierarchy).
fn attach_metaclass(class: &Arc<Class>, class_class: &Arc<Class>) {
    let meta_super = class
        .superclass()
        .and_then(|s| s.metaclass())
        .unwrap_or(class_class);
    let meta = Class::raw(&format!("{} class", class.name()), Some(meta_super), &[]);
    let _ = class.metaclass.set(meta);
}
