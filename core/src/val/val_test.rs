#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use num_bigint::BigInt;

    use crate::symbol::Symbol;
    use crate::universe::ClassTable;
    use crate::val::num::{ArithOp, CmpOp, compare, decrement, increment, integer_binary};
    use crate::val::{Instance, Val};

    macro_rules! test_int_op {
        ($name:ident, $op:expr, $l:expr, $r:expr, $res:expr) => {
            #[test]
            fn $name() {
                let l: Val = $l.into();
                let r: Val = $r.into();
                let res: Val = $res.into();
                assert_eq!(integer_binary($op, &l, &r).unwrap().unwrap(), res);
            }
        };
    }

    test_int_op!(add, ArithOp::Add, 1i64, 2i64, 3i64);
    test_int_op!(sub, ArithOp::Sub, 1i64, 2i64, -1i64);
    test_int_op!(mul, ArithOp::Mul, 6i64, -7i64, -42i64);
    test_int_op!(quo_floors, ArithOp::Quo, -7i64, 2i64, -4i64);
    test_int_op!(rem_takes_divisor_sign, ArithOp::Rem, -7i64, 2i64, 1i64);
    test_int_op!(rem_negative_divisor, ArithOp::Rem, 7i64, -2i64, -1i64);

    #[test]
    fn overflow_promotes_and_reduces() {
        let max = Val::Int(i64::MAX);
        let big = integer_binary(ArithOp::Mul, &max, &Val::Int(4)).unwrap().unwrap();
        assert_eq!(big.to_string(), (BigInt::from(i64::MAX) * BigInt::from(4)).to_string());
        let back = integer_binary(ArithOp::Quo, &big, &Val::Int(4)).unwrap().unwrap();
        assert!(matches!(back, Val::Int(i64::MAX)));
        assert!(matches!(increment(&max), Some(Ok(Val::BigInt(_)))));
        assert!(matches!(decrement(&Val::Int(i64::MIN)), Some(Ok(Val::BigInt(_)))));
    }

    #[test]
    fn non_integers_are_not_integer_arithmetic() {
        assert!(integer_binary(ArithOp::Add, &Val::Double(1.0), &Val::Int(1)).is_none());
        assert!(integer_binary(ArithOp::Add, &Val::Int(1), &Val::from("1")).is_none());
        assert!(integer_binary(ArithOp::Quo, &Val::Int(1), &Val::Int(0)).unwrap().is_err());
    }

    #[test]
    fn compare_mixes_numbers() {
        assert_eq!(compare(CmpOp::Lt, &Val::Int(1), &Val::Double(1.5)), Some(true));
        assert_eq!(compare(CmpOp::Ge, &Val::from(BigInt::from(i64::MAX) + 1), &Val::Int(i64::MAX)), Some(true));
        assert_eq!(compare(CmpOp::Eq, &Val::Int(1), &Val::from("1")), None);
    }

    #[test]
    fn from_conversions() {
        assert!(matches!(Val::from(3i64), Val::Int(3)));
        assert!(matches!(Val::from(true), Val::Bool(true)));
        assert!(matches!(Val::from(()), Val::Nil));
        assert!(matches!(Val::from(BigInt::from(12)), Val::Int(12)));
        assert!(matches!(Val::from(Symbol::intern("at:put:")), Val::Symbol(_)));
        assert_eq!(Val::from(String::from("abc")), Val::from("abc"));
    }

    #[test]
    fn display() {
        assert_eq!(Val::Nil.to_string(), "nil");
        assert_eq!(Val::Double(2.5).to_string(), "2.5");
        assert_eq!(Val::Double(3.0).to_string(), "3.0");
        assert_eq!(Val::from("it's").to_string(), "it's");
        assert_eq!(Val::from(Symbol::intern("foo:")).to_string(), "#foo:");
        let arr = Val::new_array(vec![Val::Int(1), Val::from("a"), Val::new_array(vec![])]);
        assert_eq!(arr.to_string(), "#(1 a #())");
        assert_eq!(format!("{:?}", Val::from("a")), "\"a\"");
    }

    #[test]
    fn equality_and_identity() {
        let a = Val::from("abc");
        let b = Val::from("abc");
        assert_eq!(a, b);
        assert!(!a.is_identical(&b));
        assert!(a.is_identical(&a.clone()));

        assert_eq!(Val::Int(3), Val::from(BigInt::from(3)));
        assert_ne!(Val::Int(3), Val::Double(3.0));
        assert!(Val::Symbol(Symbol::intern("x")).is_identical(&Val::Symbol(Symbol::intern("x"))));

        let arr = Val::new_array(vec![Val::Int(1)]);
        assert_ne!(arr, Val::new_array(vec![Val::Int(1)]));
        assert_eq!(arr, arr.clone());
    }

    #[test]
    fn instance_fields_follow_layout_changes() {
        let classes = ClassTable::new();
        let point = classes.define_class("Point", &classes.core().object, &["x"]);
        let p = Arc::new(Instance::new(&point));
        p.set_field(0, Val::Int(4)).unwrap();
        assert!(p.field(1).is_err());

        classes.add_field(&point, "y");
        assert!(!p.has_layout(&point.layout()));
        assert_eq!(p.field(1).unwrap(), Val::Nil);
        assert!(p.has_layout(&point.layout()));
        assert_eq!(p.field(0).unwrap(), Val::Int(4));
        assert_eq!(Val::Object(p).to_string(), "a Point");
    }
}
