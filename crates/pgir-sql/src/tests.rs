use super::*;
use proptest::prelude::*;

#[test]
fn quote_ident_only_when_needed() {
    assert_eq!(quote_ident("users"), "users");
    assert_eq!(quote_ident("user_2fa"), "user_2fa");
    assert_eq!(quote_ident("Users"), "\"Users\"");
    assert_eq!(quote_ident("order"), "\"order\"");
    assert_eq!(quote_ident("2fa"), "\"2fa\"");
    assert_eq!(quote_ident("with space"), "\"with space\"");
    assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    assert_eq!(quote_ident(""), "\"\"");
}

#[test]
fn qualified_names() {
    assert_eq!(qualified_name("public", "users"), "public.users");
    assert_eq!(qualified_name("App", "user"), "\"App\".\"user\"");
}

#[test]
fn collapse_whitespace_keeps_quoted_runs() {
    assert_eq!(
        collapse_whitespace("  SELECT   'a  b',\n\t\"x  y\"  FROM t  "),
        "SELECT 'a  b', \"x  y\" FROM t"
    );
    assert_eq!(
        collapse_whitespace("AS $fn$\n  BEGIN\n    RETURN  1;\n  END\n$fn$   LANGUAGE  plpgsql"),
        "AS $fn$\n  BEGIN\n    RETURN  1;\n  END\n$fn$ LANGUAGE plpgsql"
    );
    assert_eq!(collapse_whitespace("$$ a  b $$"), "$$ a  b $$");
    assert_eq!(collapse_whitespace("a$b   =  $1  +   $2"), "a$b = $1 + $2");
    assert_eq!(collapse_whitespace("'it''s  ok'   x"), "'it''s  ok' x");
}

#[test]
fn lexer_handles_quotes_and_comments() {
    let tokens = tokenize(
        "SELECT 'it''s', \"Mixed\"\"Q\", E'a\\'b', $f$ body; $f$ -- trailing\n/* block /* nested */ */ $1",
    )
    .unwrap();
    let kinds: Vec<_> = tokens.iter().map(|t| (t.kind, t.value.as_str())).collect();
    assert_eq!(
        kinds,
        vec![
            (TokenKind::Word, "SELECT"),
            (TokenKind::String, "it's"),
            (TokenKind::Comma, ","),
            (TokenKind::QuotedIdent, "Mixed\"Q"),
            (TokenKind::Comma, ","),
            (TokenKind::EscapeString, "a\\'b"),
            (TokenKind::Comma, ","),
            (TokenKind::DollarString, " body; "),
            (TokenKind::Param, "1"),
        ]
    );
}

#[test]
fn lexer_splits_operators_like_the_server() {
    let tokens = tokenize("a<-b c::int d->>'k' e!=f").unwrap();
    let ops: Vec<_> = tokens
        .iter()
        .filter(|t| matches!(t.kind, TokenKind::Operator | TokenKind::Typecast))
        .map(|t| t.value.as_str())
        .collect();
    assert_eq!(ops, vec!["<", "-", "::", "->>", "!="]);
}

#[test]
fn lexer_reports_unterminated_strings() {
    let err = tokenize("select 'oops").unwrap_err();
    assert_eq!(err.position, 7);
}

#[test]
fn canonical_type_names() {
    let cases = [
        ("int4", "integer"),
        ("INT", "integer"),
        ("int8", "bigint"),
        ("int2", "smallint"),
        ("float4", "real"),
        ("float8", "double precision"),
        ("float(10)", "real"),
        ("float(53)", "double precision"),
        ("bool", "boolean"),
        ("character varying(255)", "varchar(255)"),
        ("character(3)", "char(3)"),
        ("bpchar", "char"),
        ("decimal(12,4)", "numeric(12,4)"),
        ("timestamp without time zone", "timestamp"),
        ("timestamp with time zone", "timestamptz"),
        ("time with time zone", "timetz"),
        ("bit varying(8)", "varbit(8)"),
        ("_int4", "integer[]"),
        ("text[]", "text[]"),
        ("integer[3][3]", "integer[][]"),
        ("pg_catalog.int4", "integer"),
        ("public.mood", "public.mood"),
        ("\"Mood\"", "\"Mood\""),
    ];
    for (input, expected) in cases {
        assert_eq!(canonical_type(input), expected, "{input}");
    }
}

#[test]
fn column_type_split() {
    let split = TypeName::parse("character varying(64)").column_type();
    assert_eq!(split.data_type, "varchar");
    assert_eq!(split.max_length, Some(64));

    let split = TypeName::parse("numeric(10,2)[]").column_type();
    assert_eq!(split.data_type, "numeric[]");
    assert_eq!((split.precision, split.scale), (Some(10), Some(2)));

    let split = TypeName::parse("char").column_type();
    assert_eq!(split.max_length, Some(1));

    let split = TypeName::parse("timestamp(3) with time zone").column_type();
    assert_eq!(split.data_type, "timestamptz");
    assert_eq!(split.precision, Some(3));
}

#[test]
fn strip_schema_handles_quoting() {
    assert_eq!(strip_schema("app.mood", "app"), "mood");
    assert_eq!(strip_schema("\"App\".mood", "App"), "mood");
    assert_eq!(strip_schema("other.mood", "app"), "other.mood");
}

proptest! {
    #[test]
    fn quoted_identifiers_lex_back_to_themselves(name in "[A-Za-z_\" ][A-Za-z0-9_\" ]{0,12}") {
        let quoted = quote_ident(&name);
        let tokens = tokenize(&quoted).unwrap();
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(tokens[0].ident().unwrap(), name);
    }

    #[test]
    fn literals_lex_back_to_themselves(value in "[^\\x00]{0,16}") {
        let tokens = tokenize(&escape_string(&value)).unwrap();
        prop_assert_eq!(tokens.len(), 1);
        prop_assert_eq!(&tokens[0].value, &value);
    }
}
