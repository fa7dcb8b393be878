use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::ext::IdentExt;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Lit, Meta, NestedMeta};


#[proc_macro_derive(
    Record,
    attributes(table, explicit_columns, primary_key, column, result_column, ignore_column)
)]
pub fn record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

#[derive(Default)]
struct ColumnOpts {
    name: Option<String>,
    force_utc: bool,
    result: bool,
}

struct PrimaryKeyOpts {
    name: String,
    auto_increment: bool,
    sequence: Option<String>,
}

fn lit_str(lit: &Lit) -> syn::Result<String> {
    match lit {
        Lit::Str(s) if !s.value().trim().is_empty() => Ok(s.value()),
        Lit::Str(s) => Err(syn::Error::new_spanned(s, "name must not be blank")),
        other => Err(syn::Error::new_spanned(other, "expected a string literal")),
    }
}

fn lit_bool(lit: &Lit) -> syn::Result<bool> {
    match lit {
        Lit::Bool(b) => Ok(b.value),
        other => Err(syn::Error::new_spanned(other, "expected `true` or `false`")),
    }
}

fn opt_str(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(v) => quote! { ::core::option::Option::Some(#v) },
        None => quote! { ::core::option::Option::None },
    }
}

fn parse_table(attr: &Attribute) -> syn::Result<String> {
    let mut name = None;
    if let Meta::List(list) = attr.parse_meta()? {
        for nested in list.nested.iter() {
            match nested {
                NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("name") => {
                    name = Some(lit_str(&nv.lit)?);
                }
                NestedMeta::Lit(lit @ Lit::Str(_)) => name = Some(lit_str(lit)?),
                other => return Err(syn::Error::new_spanned(other, "expected `name = \"...\"`")),
            }
        }
    }
    name.ok_or_else(|| syn::Error::new_spanned(attr, "expected `#[table(name = \"...\")]`"))
}

fn parse_primary_key(attr: &Attribute) -> syn::Result<PrimaryKeyOpts> {
    let mut name = None;
    let mut auto_increment = true;
    let mut sequence = None;
    if let Meta::List(list) = attr.parse_meta()? {
        for nested in list.nested.iter() {
            match nested {
                NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("name") => {
                    name = Some(lit_str(&nv.lit)?);
                }
                NestedMeta::Lit(lit @ Lit::Str(_)) => name = Some(lit_str(lit)?),
                NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("auto_increment") => {
                    auto_increment = lit_bool(&nv.lit)?;
                }
                NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("sequence") => {
                    sequence = Some(lit_str(&nv.lit)?);
                }
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "expected `name`, `auto_increment` or `sequence`",
                    ))
                }
            }
        }
    }
    let name = name.ok_or_else(|| {
        syn::Error::new_spanned(attr, "expected `#[primary_key(name = \"...\")]`")
    })?;
    Ok(PrimaryKeyOpts {
        name,
        auto_increment,
        sequence,
    })
}

fn parse_column(attr: &Attribute, opts: &mut ColumnOpts) -> syn::Result<()> {
    match attr.parse_meta()? {
        Meta::Path(_) => {}
        Meta::List(list) => {
            for nested in list.nested.iter() {
                match nested {
                    NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("name") => {
                        opts.name = Some(lit_str(&nv.lit)?);
                    }
                    NestedMeta::Lit(lit @ Lit::Str(_)) => opts.name = Some(lit_str(lit)?),
                    NestedMeta::Meta(Meta::Path(p)) if p.is_ident("force_utc") => {
                        opts.force_utc = true;
                    }
                    NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("force_utc") => {
                        opts.force_utc = lit_bool(&nv.lit)?;
                    }
                    other => {
                        return Err(syn::Error::new_spanned(
                            other,
                            "expected `name = \"...\"` or `force_utc`",
                        ))
                    }
                }
            }
        }
        Meta::NameValue(nv) => {
            return Err(syn::Error::new_spanned(nv, "expected a parenthesized list"));
        }
    }
    Ok(())
}

pub(crate) fn record_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let ident = &input.ident;
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic types",
        ));
    }
    let fields = match &input.data {
        Data::Struct(ds) => match &ds.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    ident,
                    "Record requires a struct with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                ident,
                "Record can only be derived for structs",
            ))
        }
    };

    let mut table_name: Option<String> = None;
    let mut explicit_columns = false;
    let mut primary_key: Option<PrimaryKeyOpts> = None;
    for attr in &input.attrs {
        if attr.path.is_ident("table") {
            table_name = Some(parse_table(attr)?);
        } else if attr.path.is_ident("explicit_columns") {
            explicit_columns = true;
        } else if attr.path.is_ident("primary_key") {
            primary_key = Some(parse_primary_key(attr)?);
        }
    }

    let mut member_decls = Vec::new();
    let mut default_fields = Vec::new();
    let mut value_arms = Vec::new();
    let mut set_arms = Vec::new();
    let mut assoc_consts = Vec::new();

    for field in fields {
        let Some(field_ident) = field.ident.as_ref() else {
            continue;
        };
        let ty = &field.ty;
        let name = field_ident.unraw().to_string();

        let mut column: Option<ColumnOpts> = None;
        let mut ignore = false;
        for attr in &field.attrs {
            let result = attr.path.is_ident("result_column");
            if attr.path.is_ident("column") || result {
                if column.is_some() {
                    return Err(syn::Error::new_spanned(
                        attr,
                        "use only one of `#[column]` and `#[result_column]`",
                    ));
                }
                let mut opts = ColumnOpts {
                    result,
                    ..ColumnOpts::default()
                };
                parse_column(attr, &mut opts)?;
                column = Some(opts);
            } else if attr.path.is_ident("ignore_column") {
                ignore = true;
            }
        }

        let column_tokens = match &column {
            Some(opts) => {
                let col_name = opt_str(&opts.name);
                let force_utc = opts.force_utc;
                let result = opts.result;
                quote! {
                    ::core::option::Option::Some(::rpoco::ColumnAttr {
                        name: #col_name,
                        force_to_utc: #force_utc,
                        result: #result,
                    })
                }
            }
            None => quote! { ::core::option::Option::None },
        };
        member_decls.push(quote! {
            ::rpoco::MemberDecl {
                name: #name,
                column: #column_tokens,
                ignore: #ignore,
            }
        });

        assoc_consts.push(quote! {
            pub const #field_ident: ::rpoco::Field<#ident, #ty> = ::rpoco::Field::new(#name);
        });

        default_fields.push(quote! {
            #field_ident: ::core::default::Default::default()
        });

        // Members the annotations leave unmapped need not be convertible, so
        // they get no accessors; a mapper that maps one anyway is reported
        // as an unresolved column.
        let mapped = if explicit_columns {
            column.is_some()
        } else {
            !ignore
        };
        if !mapped {
            continue;
        }

        value_arms.push(quote! {
            #name => ::core::option::Option::Some(
                ::rpoco::ToParam::to_param(::core::clone::Clone::clone(&self.#field_ident))
            ),
        });
        set_arms.push(quote! {
            #name => {
                self.#field_ident = ::rpoco::FromParam::from_param(value)?;
            }
        });
    }

    let type_name = ident.unraw().to_string();
    let table_tokens = opt_str(&table_name);
    let pk_tokens = match &primary_key {
        Some(pk) => {
            let pk_name = &pk.name;
            let auto_increment = pk.auto_increment;
            let sequence = opt_str(&pk.sequence);
            quote! {
                ::core::option::Option::Some(::rpoco::PrimaryKeyAttr {
                    name: #pk_name,
                    auto_increment: #auto_increment,
                    sequence_name: #sequence,
                })
            }
        }
        None => quote! { ::core::option::Option::None },
    };

    Ok(quote! {
        impl ::rpoco::Record for #ident {
            fn declaration() -> &'static ::rpoco::TypeDecl {
                static DECLARATION: ::rpoco::TypeDecl = ::rpoco::TypeDecl {
                    type_name: #type_name,
                    module_path: ::core::module_path!(),
                    table_name: #table_tokens,
                    primary_key: #pk_tokens,
                    explicit_columns: #explicit_columns,
                    members: &[#(#member_decls),*],
                };
                &DECLARATION
            }

            fn from_row(
                row: &::rpoco::Row,
                data: &::rpoco::PocoData,
            ) -> ::rpoco::anyhow::Result<Self> {
                let mut record = Self {
                    #(#default_fields),*
                };
                for column in data.columns.values() {
                    let value = row.get_param(&column.column_name);
                    if let ::core::option::Option::Some(value) = value {
                        ::rpoco::anyhow::Context::with_context(
                            ::rpoco::Record::set_member(
                                &mut record,
                                column.member.name,
                                ::core::clone::Clone::clone(value),
                            ),
                            || ::std::format!("column `{}`", column.column_name),
                        )?;
                    }
                }
                ::core::result::Result::Ok(record)
            }

            fn member_value(&self, member: &str) -> ::core::option::Option<::rpoco::SqlParam> {
                match member {
                    #(#value_arms)*
                    _ => ::core::option::Option::None,
                }
            }

            #[allow(unused_variables, unreachable_code)]
            fn set_member(
                &mut self,
                member: &str,
                value: ::rpoco::SqlParam,
            ) -> ::rpoco::anyhow::Result<()> {
                match member {
                    #(#set_arms)*
                    _ => {
                        return ::core::result::Result::Err(
                            ::rpoco::MappingError::UnresolvedColumn {
                                record: #type_name,
                                column: ::std::string::ToString::to_string(member),
                            }
                            .into(),
                        );
                    }
                }
                ::core::result::Result::Ok(())
            }
        }

        #[allow(non_upper_case_globals)]
        impl #ident {
            #(#assoc_consts)*
        }
    })
}
